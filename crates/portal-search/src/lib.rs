//! # portal-search
//!
//! Tantivy index for portal content.
//!
//! This crate owns the on-disk index: its schema, analyzers, the
//! [`IndexDocument`] written by the indexing pipeline, and an
//! [`IndexInspector`] for reading back what was written.
//!
//! ## Features
//! - Embedded Tantivy index with MmapDirectory for persistence
//! - Composite entity key term for single-entity deletes
//! - Stemming analyzers per content language
//! - Lock-contention classification for writer acquisition

pub mod analyzer;
pub mod document;
pub mod error;
pub mod index;
pub mod inspector;
pub mod schema;

pub use analyzer::{register_analyzers, Analyzer, ContentLanguage, DEFAULT_ANALYZER};
pub use document::IndexDocument;
pub use error::SearchError;
pub use index::{open_or_create_index, ContentIndex, ContentIndexConfig};
pub use inspector::{IndexInspector, StoredDocument};
pub use schema::{build_portal_schema, entity_key, IndexSchema};
