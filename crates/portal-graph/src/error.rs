//! Content graph error types.

use thiserror::Error;

use crate::node::NodeKey;

/// Errors raised while navigating the content graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Parent edges loop back onto a node already visited
    #[error("Cycle in content graph at {key}")]
    Cycle { key: NodeKey },
}
