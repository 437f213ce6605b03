//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LevelDB error: {0}")]
    Backend(String),

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("malformed key in {table}: {len} bytes")]
    MalformedKey { table: String, len: usize },

    #[error("no free ids left in {namespace}")]
    IdSpaceExhausted { namespace: String },
}
