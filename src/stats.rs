use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Metrics of one descriptor run.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock time of the whole run.
    pub duration: Duration,
    pub count: u64,
    /// Executions whose statement reported an error. Still counted and timed.
    pub errors: u64,
    pub total_time: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Every call duration, in completion order.
    pub durations: Vec<Duration>,
}

impl ExecutionResult {
    pub fn arithmetic_mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_time.as_nanos() / u128::from(self.count);
        Duration::from_nanos(nanos as u64)
    }

    /// Geometric mean of the call durations, averaged in log2 space.
    pub fn geometric_mean(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let sum_exp: f64 = self
            .durations
            .iter()
            .map(|d| (d.as_nanos() as f64).log2())
            .sum();
        let mean_exp = sum_exp / self.durations.len() as f64;
        Duration::from_nanos(mean_exp.exp2().round() as u64)
    }

    /// Executions per second of wall-clock time.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.count as f64 / secs
        }
    }
}

#[derive(Debug, Default)]
struct Samples {
    count: u64,
    errors: u64,
    total_time: Duration,
    min: Duration,
    max: Duration,
    durations: Vec<Duration>,
}

/// Accumulator shared by all workers of one descriptor run.
///
/// Each sample is folded in under a single lock acquisition.
#[derive(Debug)]
pub struct Aggregator {
    start: Instant,
    started_at: DateTime<Utc>,
    samples: Mutex<Samples>,
}

impl Aggregator {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            started_at: Utc::now(),
            samples: Mutex::new(Samples::default()),
        }
    }

    pub fn record(&self, duration: Duration) {
        self.fold(duration, false);
    }

    /// Records a call whose statement failed.
    pub fn record_failure(&self, duration: Duration) {
        self.fold(duration, true);
    }

    fn fold(&self, duration: Duration, failed: bool) {
        let mut s = self.samples.lock();
        s.count += 1;
        if failed {
            s.errors += 1;
        }
        s.durations.push(duration);
        s.total_time += duration;
        if duration > s.max {
            s.max = duration;
        }
        if s.min.is_zero() || duration < s.min {
            s.min = duration;
        }
    }

    /// Stamps the end of the run. Call once every worker has returned.
    pub fn finish(self) -> ExecutionResult {
        let duration = self.start.elapsed();
        let s = self.samples.into_inner();
        ExecutionResult {
            started_at: self.started_at,
            ended_at: Utc::now(),
            duration,
            count: s.count,
            errors: s.errors,
            total_time: s.total_time,
            min: s.min,
            max: s.max,
            durations: s.durations,
        }
    }
}
