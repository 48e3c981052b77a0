//! Typed field values returned by the entity store.
//!
//! Every value travels with the attribute type declared by the store's
//! metadata, so downstream encoding never has to guess.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared attribute type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Uniqueidentifier,
    Lookup,
    Customer,
    Owner,
    DateTime,
    String,
    Memo,
    Picklist,
    State,
    Status,
    Boolean,
    Integer,
    BigInt,
    Decimal,
    Double,
    Money,
    EntityName,
    Virtual,
}

impl AttributeType {
    /// Identifier-like types (primary keys and references).
    pub fn is_identifier(&self) -> bool {
        matches!(
            self,
            AttributeType::Uniqueidentifier
                | AttributeType::Lookup
                | AttributeType::Customer
                | AttributeType::Owner
        )
    }

    /// Types whose content goes into the searchable text blob.
    pub fn is_free_text(&self) -> bool {
        matches!(self, AttributeType::String | AttributeType::Memo)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, AttributeType::DateTime)
    }
}

/// Reference to another entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReference {
    pub logical_name: String,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl EntityReference {
    pub fn new(logical_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Id(String),
    Reference(EntityReference),
    OptionSet { value: i32, label: Option<String> },
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn id(s: impl Into<String>) -> Self {
        FieldValue::Id(s.into())
    }

    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Canonical id when the value identifies a record.
    pub fn as_id(&self) -> Option<String> {
        match self {
            FieldValue::Id(id) => Some(canonical_id(id)),
            FieldValue::Reference(r) => Some(canonical_id(&r.id)),
            FieldValue::Text(s) if !s.is_empty() => Some(canonical_id(s)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::Id(id) => write!(f, "{}", canonical_id(id)),
            FieldValue::Reference(r) => write!(f, "{}", canonical_id(&r.id)),
            FieldValue::OptionSet { value, .. } => write!(f, "{value}"),
        }
    }
}

/// A value paired with its declared attribute type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: FieldValue,
    pub attribute_type: AttributeType,
}

impl TypedValue {
    pub fn new(value: FieldValue, attribute_type: AttributeType) -> Self {
        Self {
            value,
            attribute_type,
        }
    }
}

/// Canonical string form of a record id: braces stripped, lowercase.
pub fn canonical_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .to_ascii_lowercase()
}
