//! Error types for the state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
///
/// Absence of a name is not an error — lookups return `Ok(None)` and
/// removals `Ok(false)` for names that do not exist.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("type mismatch for `{key}`: {detail}")]
    TypeMismatch { key: String, detail: String },

    #[error("optimistic flush conflict at `{0}`")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(#[from] strato_table::TableError),
}
