//! Content graph node types.

use serde::{Deserialize, Serialize};

use portal_types::canonical_id;

/// Identity of a node: entity type plus canonical record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub logical_name: String,
    pub id: String,
}

impl NodeKey {
    pub fn new(logical_name: impl Into<String>, id: &str) -> Self {
        Self {
            logical_name: logical_name.into(),
            id: canonical_id(id),
        }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.logical_name, self.id)
    }
}

/// Right granted or restricted by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRight {
    /// Holders may change the node and, implicitly, read it.
    GrantChange,
    /// Only holders may read the node and its descendants.
    RestrictRead,
}

/// An access rule attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub name: String,
    pub right: AccessRight,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Publishing states the rule is limited to; empty means all.
    #[serde(default)]
    pub publishing_states: Vec<String>,
}

impl AccessRule {
    pub fn new(name: impl Into<String>, right: AccessRight, roles: &[&str]) -> Self {
        Self {
            name: name.into(),
            right,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            publishing_states: Vec::new(),
        }
    }

    pub fn with_publishing_states(mut self, states: &[&str]) -> Self {
        self.publishing_states = states.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Whether the rule is in force for a node in `state`.
    pub fn applies_to(&self, state: Option<&str>) -> bool {
        if self.publishing_states.is_empty() {
            return true;
        }
        state.is_some_and(|state| {
            self.publishing_states
                .iter()
                .any(|s| s.eq_ignore_ascii_case(state))
        })
    }
}

/// A node of the content graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub key: NodeKey,
    #[serde(default)]
    pub parent: Option<NodeKey>,
    /// Filled in by [`crate::ContentGraph::from_nodes`].
    #[serde(default)]
    pub children: Vec<NodeKey>,
    #[serde(default)]
    pub rules: Vec<AccessRule>,
    #[serde(default)]
    pub publishing_state: Option<String>,
    #[serde(default)]
    pub partial_url: Option<String>,
    /// Root pages own the url; language content pages hang below them.
    #[serde(default = "default_true")]
    pub is_root: bool,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ContentNode {
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            parent: None,
            children: Vec::new(),
            rules: Vec::new(),
            publishing_state: None,
            partial_url: None,
            is_root: true,
            language: None,
        }
    }

    pub fn with_parent(mut self, parent: NodeKey) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_publishing_state(mut self, state: impl Into<String>) -> Self {
        self.publishing_state = Some(state.into());
        self
    }

    pub fn with_partial_url(mut self, partial_url: impl Into<String>) -> Self {
        self.partial_url = Some(partial_url.into());
        self
    }

    /// Mark as a language content page of its (root) parent.
    pub fn as_content_page(mut self, language: impl Into<String>) -> Self {
        self.is_root = false;
        self.language = Some(language.into());
        self
    }
}
