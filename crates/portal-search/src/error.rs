//! Search index error types.

use thiserror::Error;

/// Errors raised by the content index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Stored document could not be decoded
    #[error("Stored document decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SearchError {
    /// Whether the failure is another writer holding the index (or the
    /// directory being briefly unavailable) rather than a real fault.
    ///
    /// Lock busy, lock I/O failures and plain I/O errors such as permission
    /// denied all qualify; callers retry these with backoff.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            SearchError::Tantivy(tantivy::TantivyError::LockFailure(_, _)) => true,
            SearchError::Tantivy(tantivy::TantivyError::IoError(_)) => true,
            SearchError::Io(_) => true,
            _ => false,
        }
    }
}
