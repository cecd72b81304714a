use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::bencher::{Bencher, Execute};
use crate::databases::generic_workload;
use crate::descriptor::BenchmarkDescriptor;
use crate::error::Result;

/// Executes nothing. Logs each statement at debug level and counts it, which
/// makes it useful for previewing what a script would send.
#[derive(Debug, Default)]
pub struct DryRun {
    executed: AtomicU64,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl Execute for DryRun {
    fn exec(&self, statement: &str) -> Result<()> {
        self.executed.fetch_add(1, Ordering::Relaxed);
        debug!(statement, "dry run");
        Ok(())
    }
}

impl Bencher for DryRun {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn setup(&self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&self, _close_connection: bool) {}

    fn benchmarks(&self) -> Vec<BenchmarkDescriptor> {
        generic_workload("Generic")
    }
}
