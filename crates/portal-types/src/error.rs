//! Error types shared across the portal indexing crates.

use thiserror::Error;

/// Unified error type for configuration and shared value handling.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
