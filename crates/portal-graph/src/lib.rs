//! # portal-graph
//!
//! Read-only view of the portal's content graph: web pages, forums, blogs
//! and their children, linked by parent/child edges and carrying access
//! rules.
//!
//! The [`RoleResolver`] computes which roles may read a node, combining the
//! node's own rules with everything it inherits from its ancestors.

pub mod error;
pub mod graph;
pub mod node;
pub mod roles;

pub use error::GraphError;
pub use graph::{ContentGraph, ContentGraphProvider, PageSet, StaticGraphProvider};
pub use node::{AccessRight, AccessRule, ContentNode, NodeKey};
pub use roles::RoleResolver;
