//! Filter trees and atomic conditions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the members of a filter combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    And,
    Or,
}

/// Condition operator.
///
/// Operators this crate does not know are carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Eq,
    Ne,
    In,
    NotIn,
    Null,
    NotNull,
    Like,
    Under,
    EqOrUnder,
    Other(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::Eq => "eq",
            ConditionOperator::Ne => "ne",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not-in",
            ConditionOperator::Null => "null",
            ConditionOperator::NotNull => "not-null",
            ConditionOperator::Like => "like",
            ConditionOperator::Under => "under",
            ConditionOperator::EqOrUnder => "eq-or-under",
            ConditionOperator::Other(op) => op,
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "eq" => ConditionOperator::Eq,
            "ne" => ConditionOperator::Ne,
            "in" => ConditionOperator::In,
            "not-in" => ConditionOperator::NotIn,
            "null" => ConditionOperator::Null,
            "not-null" => ConditionOperator::NotNull,
            "like" => ConditionOperator::Like,
            "under" => ConditionOperator::Under,
            "eq-or-under" => ConditionOperator::EqOrUnder,
            _ => ConditionOperator::Other(s),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic condition on one attribute of the enclosing scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    pub fn new(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        values: Vec<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            values,
            extra: Map::new(),
        }
    }

    /// Same attribute, operator and values; passthrough members are ignored.
    pub fn same_as(&self, other: &Condition) -> bool {
        self.attribute == other.attribute
            && self.operator == other.operator
            && self.values == other.values
    }
}

/// Filter tree: conditions and nested filters joined by one combinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type", default)]
    pub kind: FilterKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Filter {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Attribute names referenced anywhere in this tree.
    pub fn referenced_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .conditions
            .iter()
            .map(|c| c.attribute.as_str())
            .collect();
        for nested in &self.filters {
            names.extend(nested.referenced_attributes());
        }
        names
    }
}
