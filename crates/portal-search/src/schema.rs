//! Tantivy schema for portal content documents.
//!
//! Every document carries its entity type, primary key and a composite
//! `logical_name:primary_key` term so one delete removes exactly one entity.
//! Searchable text lives in `content` (default analyzer) or in the
//! `content_<lang>` field of its language. Type-specific exact fields are
//! stored in the `fields` JSON object.

use std::collections::HashMap;

use tantivy::schema::{
    Field, IndexRecordOption, JsonObjectOptions, Schema, TextFieldIndexing, TextOptions, INDEXED,
    STORED, STRING,
};
use tantivy::Term;

use portal_types::canonical_id;

use crate::analyzer::{Analyzer, ContentLanguage, DEFAULT_ANALYZER};
use crate::SearchError;

/// Field names used in the schema.
pub mod fields {
    pub const LOGICAL_NAME: &str = "logical_name";
    pub const PRIMARY_KEY: &str = "primary_key";
    pub const ENTITY_KEY: &str = "entity_key";
    pub const TITLE: &str = "title";
    pub const CONTENT: &str = "content";
    pub const LANGUAGE: &str = "language";
    pub const ROLES: &str = "roles";
    pub const URL_DEFINED: &str = "url_defined";
    pub const SCOPE: &str = "scope";
    pub const FIELDS: &str = "fields";
}

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct IndexSchema {
    schema: Schema,
    /// Entity type (STRING | STORED)
    pub logical_name: Field,
    /// Canonical record id (STRING | STORED)
    pub primary_key: Field,
    /// `logical_name:primary_key` (STRING | STORED)
    pub entity_key: Field,
    /// Title (TEXT | STORED)
    pub title: Field,
    /// Content analyzed with the default analyzer (TEXT)
    pub content: Field,
    /// Language code (STRING | STORED)
    pub language: Field,
    /// Roles allowed to read the document, multi-valued (STRING | STORED)
    pub roles: Field,
    /// Whether the document has a resolvable url (INDEXED | STORED)
    pub url_defined: Field,
    /// Free-form scope tag (STRING | STORED)
    pub scope: Field,
    /// Type-specific exact fields (JSON, raw | STORED)
    pub fields: Field,
    language_content: HashMap<ContentLanguage, Field>,
}

impl IndexSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create an IndexSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {name} field")))
        };

        let mut language_content = HashMap::new();
        for language in ContentLanguage::ALL {
            language_content.insert(language, field(&language.content_field_name())?);
        }

        Ok(Self {
            logical_name: field(fields::LOGICAL_NAME)?,
            primary_key: field(fields::PRIMARY_KEY)?,
            entity_key: field(fields::ENTITY_KEY)?,
            title: field(fields::TITLE)?,
            content: field(fields::CONTENT)?,
            language: field(fields::LANGUAGE)?,
            roles: field(fields::ROLES)?,
            url_defined: field(fields::URL_DEFINED)?,
            scope: field(fields::SCOPE)?,
            fields: field(fields::FIELDS)?,
            language_content,
            schema,
        })
    }

    /// Content field for the given analyzer.
    pub fn content_field(&self, analyzer: Analyzer) -> Field {
        match analyzer {
            Analyzer::Default => self.content,
            Analyzer::Language(language) => self
                .language_content
                .get(&language)
                .copied()
                .unwrap_or(self.content),
        }
    }

    /// All content fields, default first.
    pub fn content_fields(&self) -> Vec<Field> {
        let mut out = vec![self.content];
        out.extend(ContentLanguage::ALL.iter().filter_map(|l| self.language_content.get(l)));
        out
    }

    /// Term matching every document of an entity type.
    pub fn logical_name_term(&self, logical_name: &str) -> Term {
        Term::from_field_text(self.logical_name, &logical_name.to_ascii_lowercase())
    }

    /// Term matching exactly one entity.
    pub fn entity_key_term(&self, logical_name: &str, primary_key: &str) -> Term {
        Term::from_field_text(self.entity_key, &entity_key(logical_name, primary_key))
    }
}

/// Composite key stored in the `entity_key` field.
pub fn entity_key(logical_name: &str, primary_key: &str) -> String {
    format!(
        "{}:{}",
        logical_name.to_ascii_lowercase(),
        canonical_id(primary_key)
    )
}

fn text_options(analyzer: &str, stored: bool) -> TextOptions {
    let options = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(analyzer)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    if stored {
        options.set_stored()
    } else {
        options
    }
}

/// Build the portal content schema.
pub fn build_portal_schema() -> IndexSchema {
    let mut schema_builder = Schema::builder();

    let logical_name = schema_builder.add_text_field(fields::LOGICAL_NAME, STRING | STORED);
    let primary_key = schema_builder.add_text_field(fields::PRIMARY_KEY, STRING | STORED);
    let entity_key = schema_builder.add_text_field(fields::ENTITY_KEY, STRING | STORED);

    let title = schema_builder.add_text_field(fields::TITLE, text_options(DEFAULT_ANALYZER, true));
    let content =
        schema_builder.add_text_field(fields::CONTENT, text_options(DEFAULT_ANALYZER, false));

    let mut language_content = HashMap::new();
    for language in ContentLanguage::ALL {
        let field = schema_builder.add_text_field(
            &language.content_field_name(),
            text_options(&language.analyzer_name(), false),
        );
        language_content.insert(language, field);
    }

    let language = schema_builder.add_text_field(fields::LANGUAGE, STRING | STORED);
    let roles = schema_builder.add_text_field(fields::ROLES, STRING | STORED);
    let url_defined = schema_builder.add_bool_field(fields::URL_DEFINED, INDEXED | STORED);
    let scope = schema_builder.add_text_field(fields::SCOPE, STRING | STORED);

    let json_options = JsonObjectOptions::default().set_stored().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::Basic),
    );
    let fields = schema_builder.add_json_field(fields::FIELDS, json_options);

    IndexSchema {
        schema: schema_builder.build(),
        logical_name,
        primary_key,
        entity_key,
        title,
        content,
        language,
        roles,
        url_defined,
        scope,
        fields,
        language_content,
    }
}
