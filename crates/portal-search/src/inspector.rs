//! Read-side inspection of the content index.
//!
//! Counts documents per type or entity and decodes stored documents. Used to
//! verify what a mutation actually wrote.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Document, IndexReader, TantivyDocument, Term};
use tracing::debug;

use crate::error::SearchError;
use crate::index::ContentIndex;
use crate::schema::IndexSchema;

/// Stored view of one indexed entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredDocument {
    pub logical_name: String,
    pub primary_key: String,
    pub title: Option<String>,
    pub language_code: String,
    pub roles: Vec<String>,
    pub url_defined: bool,
    pub scope: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Read-only view over committed index state.
pub struct IndexInspector {
    reader: IndexReader,
    schema: IndexSchema,
    query_parser: QueryParser,
}

impl IndexInspector {
    pub fn new(index: &ContentIndex) -> Result<Self, SearchError> {
        let reader = index.reader()?;
        let schema = index.schema().clone();

        let mut fields = vec![schema.title];
        fields.extend(schema.content_fields());
        let query_parser = QueryParser::for_index(index.index(), fields);

        Ok(Self {
            reader,
            schema,
            query_parser,
        })
    }

    /// Reload the reader to see recent commits.
    pub fn reload(&self) -> Result<(), SearchError> {
        self.reader.reload()?;
        debug!("Reloaded index reader");
        Ok(())
    }

    /// Get the number of indexed documents.
    pub fn num_docs(&self) -> Result<u64, SearchError> {
        self.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Documents of one entity type.
    pub fn count_type(&self, logical_name: &str) -> Result<usize, SearchError> {
        self.count_term(self.schema.logical_name_term(logical_name))
    }

    /// Documents for one entity; more than one means a duplicate.
    pub fn count_entity(&self, logical_name: &str, primary_key: &str) -> Result<usize, SearchError> {
        self.count_term(self.schema.entity_key_term(logical_name, primary_key))
    }

    /// Primary keys of every document of a type, sorted.
    pub fn primary_keys(&self, logical_name: &str) -> Result<Vec<String>, SearchError> {
        self.reload()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            self.schema.logical_name_term(logical_name),
            IndexRecordOption::Basic,
        );
        let limit = searcher.num_docs().max(1) as usize;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut keys = Vec::with_capacity(top_docs.len());
        for (_, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(key) = doc.get_first(self.schema.primary_key).and_then(|v| v.as_str()) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// `(logical name, primary key)` of every committed document, optionally
    /// limited to one type, sorted.
    pub fn entity_keys(
        &self,
        logical_name: Option<&str>,
    ) -> Result<Vec<(String, String)>, SearchError> {
        self.reload()?;
        let searcher = self.reader.searcher();
        let query: Box<dyn Query> = match logical_name {
            Some(name) => Box::new(TermQuery::new(
                self.schema.logical_name_term(name),
                IndexRecordOption::Basic,
            )),
            None => Box::new(AllQuery),
        };
        let limit = searcher.num_docs().max(1) as usize;

        let mut keys = Vec::new();
        for (_, address) in searcher.search(query.as_ref(), &TopDocs::with_limit(limit))? {
            let doc: TantivyDocument = searcher.doc(address)?;
            let name = doc.get_first(self.schema.logical_name).and_then(|v| v.as_str());
            let key = doc.get_first(self.schema.primary_key).and_then(|v| v.as_str());
            if let (Some(name), Some(key)) = (name, key) {
                keys.push((name.to_string(), key.to_string()));
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Stored fields of one entity, if indexed.
    pub fn stored(
        &self,
        logical_name: &str,
        primary_key: &str,
    ) -> Result<Option<StoredDocument>, SearchError> {
        self.reload()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            self.schema.entity_key_term(logical_name, primary_key),
            IndexRecordOption::Basic,
        );
        let Some((_, address)) = searcher
            .search(&query, &TopDocs::with_limit(1))?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        let json: JsonValue = serde_json::from_str(&doc.to_json(self.schema.schema()))?;
        Ok(Some(decode_stored(&json)))
    }

    /// Entity keys of documents matching a query over title and content.
    pub fn matching_keys(&self, query_str: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.reload()?;
        let searcher = self.reader.searcher();
        let (query, errors) = self.query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            debug!(query = query_str, errors = errors.len(), "Lenient query parse");
        }

        let mut keys = Vec::new();
        for (_, address) in searcher.search(&query, &TopDocs::with_limit(limit))? {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(key) = doc.get_first(self.schema.entity_key).and_then(|v| v.as_str()) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    fn count_term(&self, term: Term) -> Result<usize, SearchError> {
        self.reload()?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)?)
    }
}

/// Stored documents serialize every field as an array of values.
fn decode_stored(json: &JsonValue) -> StoredDocument {
    use crate::schema::fields;

    let first = |name: &str| json.get(name).and_then(|v| v.get(0));
    let first_str = |name: &str| first(name).and_then(JsonValue::as_str).map(str::to_string);

    let roles = json
        .get(fields::ROLES)
        .and_then(JsonValue::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let stored_fields = first(fields::FIELDS)
        .and_then(JsonValue::as_object)
        .map(|object| {
            object
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    StoredDocument {
        logical_name: first_str(fields::LOGICAL_NAME).unwrap_or_default(),
        primary_key: first_str(fields::PRIMARY_KEY).unwrap_or_default(),
        title: first_str(fields::TITLE),
        language_code: first_str(fields::LANGUAGE).unwrap_or_default(),
        roles,
        url_defined: first(fields::URL_DEFINED)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
        scope: first_str(fields::SCOPE),
        fields: stored_fields,
    }
}
