use clap::ValueEnum;

pub mod bencher;
pub mod config;
pub mod coordinator;
pub mod databases;
pub mod descriptor;
pub mod error;
pub mod harness;
pub mod random;
pub mod report;
pub mod schema;
pub mod script;
pub mod signal;
pub mod stats;
pub mod template;

pub use error::{BenchError, Result};

/// Report format written to stdout or `--out`.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Per-benchmark text summary.
    #[default]
    Text,
    /// Full report with run metadata, as pretty-printed JSON.
    Json,
}
