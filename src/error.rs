use thiserror::Error;

use crate::script::ScriptError;
use crate::template::TemplateError;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse script: {0}")]
    Script(#[from] ScriptError),

    #[error("failed to compile template of benchmark '{name}': {source}")]
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("benchmark '{name}' panicked while running detached")]
    WorkerPanicked { name: String },

    #[error("invalid config: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for BenchError {
    fn from(e: rusqlite::Error) -> Self {
        BenchError::Database(e.to_string())
    }
}
