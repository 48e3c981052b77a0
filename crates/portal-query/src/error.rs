//! Query definition error types.

use thiserror::Error;

/// Errors raised while reading or adapting a query definition.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A field path or filter referenced a join alias that does not exist
    #[error("Link entity not found for alias: {alias}")]
    Lookup { alias: String },

    /// The definition violates a structural invariant
    #[error("Invalid query definition: {0}")]
    Invalid(String),

    /// JSON parse error
    #[error("Query parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
