//! Index documents and their mapping to Tantivy documents.

use std::collections::BTreeMap;

use tantivy::schema::OwnedValue;
use tantivy::TantivyDocument;

use portal_types::{canonical_id, PUBLIC_ROLE};

use crate::analyzer::Analyzer;
use crate::schema::{entity_key, IndexSchema};

/// One entity record ready to be written to the index.
///
/// A document always has exactly one entity type and primary key. Roles
/// default to the public sentinel and the url to defined; the document
/// factory overrides both for content-graph types.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub logical_name: String,
    pub primary_key: String,
    pub title: Option<String>,
    pub content: String,
    pub language_code: String,
    pub analyzer: Analyzer,
    pub roles: Vec<String>,
    pub url_defined: bool,
    pub scope: Option<String>,
    /// Exact-match fields, including derived `.date/.year/.month/.day`.
    pub fields: BTreeMap<String, String>,
}

impl IndexDocument {
    pub fn new(logical_name: &str, primary_key: &str) -> Self {
        Self {
            logical_name: logical_name.to_ascii_lowercase(),
            primary_key: canonical_id(primary_key),
            title: None,
            content: String::new(),
            language_code: String::new(),
            analyzer: Analyzer::Default,
            roles: vec![PUBLIC_ROLE.to_string()],
            url_defined: true,
            scope: None,
            fields: BTreeMap::new(),
        }
    }

    /// Composite `logical_name:primary_key` key.
    pub fn entity_key(&self) -> String {
        entity_key(&self.logical_name, &self.primary_key)
    }

    /// Append text to the content blob, space separated.
    pub fn append_content(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() {
            self.content.push(' ');
        }
        self.content.push_str(text);
    }

    /// Put the title in front of the accumulated content.
    pub fn set_title(&mut self, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            return;
        }
        self.content = if self.content.is_empty() {
            title.to_string()
        } else {
            format!("{title} {}", self.content)
        };
        self.title = Some(title.to_string());
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Convert to a Tantivy document for `schema`.
    pub fn to_tantivy(&self, schema: &IndexSchema) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(schema.logical_name, &self.logical_name);
        doc.add_text(schema.primary_key, &self.primary_key);
        doc.add_text(schema.entity_key, self.entity_key());
        if let Some(title) = &self.title {
            doc.add_text(schema.title, title);
        }
        doc.add_text(schema.content_field(self.analyzer), &self.content);
        doc.add_text(schema.language, &self.language_code);
        for role in &self.roles {
            doc.add_text(schema.roles, role);
        }
        doc.add_bool(schema.url_defined, self.url_defined);
        if let Some(scope) = &self.scope {
            doc.add_text(schema.scope, scope);
        }

        let object: BTreeMap<String, OwnedValue> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), OwnedValue::Str(value.clone())))
            .collect();
        doc.add_object(schema.fields, object);
        doc
    }
}
