//! Error types for table backends.

use thiserror::Error;

/// Result type alias for backend operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur inside a table backend.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("write conflict: {0}")]
    Conflict(String),
}
