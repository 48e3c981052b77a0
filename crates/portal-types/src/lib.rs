//! # portal-types
//!
//! Shared domain types for the portal content indexing pipeline.
//!
//! This crate defines the data structures used throughout the system:
//! - Entities: well-known logical names and relation attributes
//! - Values: typed field values as returned by the entity store
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use portal_types::{AttributeType, FieldValue, TypedValue};
//!
//! let value = TypedValue::new(FieldValue::Text("Welcome".into()), AttributeType::String);
//! assert!(value.attribute_type.is_free_text());
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod value;

pub use config::{LockSettings, Settings};
pub use entity::{attributes, logical_names, primary_key_attribute, PUBLIC_ROLE};
pub use error::PortalError;
pub use logging::init_tracing;
pub use value::{canonical_id, AttributeType, EntityReference, FieldValue, TypedValue};
