use serde::{Deserialize, Serialize};

use crate::descriptor::{BenchmarkDescriptor, Mode};
use crate::stats::ExecutionResult;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub system: String,
    pub iterations: u64,
    pub workers: usize,
    pub seed: u64,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

/// Reported metrics of one descriptor run. Durations are in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub system: String,
    pub name: String,
    pub mode: Mode,
    pub parallel: bool,

    /// Global iteration count the run was started with.
    pub multiplicity: u64,
    /// Executions requested for this descriptor after applying its ratio.
    pub iterations: u64,
    pub executions: u64,
    pub errors: u64,

    /// Wall-clock time of the whole descriptor run.
    pub total_us: u128,
    pub arith_mean_us: u128,
    pub geo_mean_us: u128,
    pub min_us: u128,
    pub max_us: u128,

    pub ops_per_sec: f64,
    pub us_per_op: f64,
}

impl Summary {
    pub fn from_result(
        system: &str,
        descriptor: &BenchmarkDescriptor,
        multiplicity: u64,
        iterations: u64,
        result: &ExecutionResult,
    ) -> Self {
        let total_us = result.duration.as_micros();
        let us_per_op = match descriptor.mode {
            Mode::Loop => total_us as f64 / iterations.max(1) as f64,
            Mode::Once => total_us as f64,
        };

        Self {
            system: system.to_string(),
            name: descriptor.name.clone(),
            mode: descriptor.mode,
            parallel: descriptor.parallel,
            multiplicity,
            iterations,
            executions: result.count,
            errors: result.errors,
            total_us,
            arith_mean_us: result.arithmetic_mean().as_micros(),
            geo_mean_us: result.geometric_mean().as_micros(),
            min_us: result.min.as_micros(),
            max_us: result.max.as_micros(),
            ops_per_sec: result.throughput(),
            us_per_op,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub run: RunMeta,
    pub summaries: Vec<Summary>,
    pub interrupted: bool,
    pub elapsed_us: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Aggregator;
    use std::time::Duration;

    fn result_with(samples: &[u64]) -> ExecutionResult {
        let agg = Aggregator::start();
        for s in samples {
            agg.record(Duration::from_micros(*s));
        }
        let mut r = agg.finish();
        r.duration = Duration::from_millis(2);
        r
    }

    #[test]
    fn loop_latency_is_per_iteration() {
        let d = BenchmarkDescriptor::looped("inserts", "INSERT ...");
        let s = Summary::from_result("sqlite", &d, 4, 4, &result_with(&[100, 200, 300, 400]));

        assert_eq!(s.executions, 4);
        assert_eq!(s.total_us, 2_000);
        assert_eq!(s.arith_mean_us, 250);
        assert_eq!(s.min_us, 100);
        assert_eq!(s.max_us, 400);
        assert_eq!(s.us_per_op, 500.0);
        assert!((s.ops_per_sec - 2_000.0).abs() < 1e-6);
    }

    #[test]
    fn once_latency_is_whole_run() {
        let d = BenchmarkDescriptor::once("setup", "CREATE ...");
        let s = Summary::from_result("sqlite", &d, 1_000, 1, &result_with(&[1_500]));
        assert_eq!(s.us_per_op, 2_000.0);
        assert_eq!(s.geo_mean_us, 1_500);
    }

    #[test]
    fn summary_serializes_mode_lowercase() {
        let d = BenchmarkDescriptor::once("setup", "CREATE ...");
        let s = Summary::from_result("sqlite", &d, 10, 1, &result_with(&[5]));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["mode"], "once");
        assert_eq!(json["name"], "setup");
    }
}
