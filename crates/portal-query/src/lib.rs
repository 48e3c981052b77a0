//! # portal-query
//!
//! Structured query definitions describing an entity fetch: the attribute
//! list, a tree of joined (linked) entities with their own filters, and the
//! paging cursor.
//!
//! Definitions are immutable values. Every transform (`with_attribute`,
//! `with_link`, `with_filter_condition`, `for_next_page`) returns a new
//! definition, so one base definition can safely seed many derived ones.
//!
//! The JSON form is lossless: members this crate does not model are kept
//! and written back unchanged.

pub mod definition;
pub mod error;
pub mod filter;

pub use definition::{Attribute, EntityNode, JoinKind, LinkEntity, QueryDefinition, ResolvedField};
pub use error::QueryError;
pub use filter::{Condition, ConditionOperator, Filter, FilterKind};
