use crate::descriptor::BenchmarkDescriptor;
use crate::error::Result;

/// Runs one concrete statement against a data store.
///
/// Implementations must be safe to call from many workers at once. A failing
/// statement is reported through the result; it never stops the benchmark.
/// The statement string may hold several `;`-separated statements, and how
/// they are grouped is up to the implementation.
pub trait Execute: Send + Sync {
    fn exec(&self, statement: &str) -> Result<()>;
}

/// A database target with its own schema lifecycle and built-in workload.
pub trait Bencher: Execute {
    fn name(&self) -> &str;

    /// Creates the schema used by the built-in workload. Safe to call repeatedly.
    fn setup(&self) -> Result<()>;

    /// Removes benchmark data, optionally closing the connection afterwards.
    /// Failures are logged; cleanup is best effort.
    fn cleanup(&self, close_connection: bool);

    fn benchmarks(&self) -> Vec<BenchmarkDescriptor>;
}
