// Error type shared by the ingestion stages.
// Only failures that abort a file or the run live here; bad records are data,
// they travel as RejectedRecord instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("rejection log: {0}")]
    Json(#[from] serde_json::Error),

    // Every configured encoding rejected the byte range starting at `offset`.
    #[error("cannot decode bytes at offset {offset} with any of [{tried}]")]
    Decode { offset: u64, tried: String },

    #[error("configuration: {0}")]
    Config(String),

    #[error("worker: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
