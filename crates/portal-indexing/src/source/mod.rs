//! Paged record source.
//!
//! The entity store and its query engine are external. The pipeline only
//! sees one page of flattened rows at a time, plus a continuation flag and
//! an opaque cursor for the next page.

mod mock;

use std::collections::BTreeMap;

use portal_query::QueryDefinition;
use portal_types::{AttributeType, EntityReference, FieldValue, TypedValue};

use crate::error::SourceError;

pub use mock::MockResultSource;

/// One flat result row: field path to typed value.
///
/// Root attributes use the bare attribute name, joined attributes use
/// `alias.attribute`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    values: BTreeMap<String, TypedValue>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, value: TypedValue) -> Self {
        self.values.insert(path.into(), value);
        self
    }

    pub fn with_id(self, path: impl Into<String>, id: &str) -> Self {
        self.with(
            path,
            TypedValue::new(FieldValue::id(id), AttributeType::Uniqueidentifier),
        )
    }

    pub fn with_text(self, path: impl Into<String>, text: &str) -> Self {
        self.with(path, TypedValue::new(FieldValue::text(text), AttributeType::String))
    }

    pub fn with_reference(self, path: impl Into<String>, reference: EntityReference) -> Self {
        self.with(
            path,
            TypedValue::new(FieldValue::Reference(reference), AttributeType::Lookup),
        )
    }

    pub fn insert(&mut self, path: impl Into<String>, value: TypedValue) {
        self.values.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<&TypedValue> {
        self.values.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypedValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<ResultRow>,
    /// More pages follow this one.
    pub more_records: bool,
    /// Cursor to pass with the next page request.
    pub paging_cookie: Option<String>,
}

/// Executes query definitions against the entity store.
pub trait ResultSource: Send + Sync {
    /// Fetch the page described by `query.page` and `query.paging_cookie`.
    fn execute(&self, query: &QueryDefinition) -> Result<ResultPage, SourceError>;
}
