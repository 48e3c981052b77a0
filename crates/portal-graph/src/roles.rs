//! Read-permission role propagation.
//!
//! A node's effective rules are its own rules plus the rules of every
//! ancestor, keeping rules limited to publishing states only when the node
//! being resolved is in one of those states.
//!
//! - Without any restrict-read rule along the chain the node is public: the
//!   result is [`PUBLIC_ROLE`] plus every grant-change role.
//! - Otherwise the result is the union of grant-change and restrict-read
//!   roles across the node and its ancestors.
//!
//! Effective rules are memoized per resolver, so siblings sharing ancestors
//! only walk them once. A resolver is one resolution cycle: create a new one
//! for each graph snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use portal_types::PUBLIC_ROLE;

use crate::error::GraphError;
use crate::graph::ContentGraph;
use crate::node::{AccessRight, AccessRule, ContentNode, NodeKey};

/// Computes readable-by role sets over one graph snapshot.
pub struct RoleResolver {
    graph: Arc<ContentGraph>,
    memo: HashMap<NodeKey, Arc<Vec<AccessRule>>>,
}

impl RoleResolver {
    pub fn new(graph: Arc<ContentGraph>) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &Arc<ContentGraph> {
        &self.graph
    }

    /// Roles allowed to read `key`. Unknown nodes yield an empty set.
    pub fn resolve(&mut self, key: &NodeKey) -> Result<Vec<String>, GraphError> {
        let Some(chain_rules) = self.effective_rules(key)? else {
            debug!(key = %key, "Node not in content graph");
            return Ok(Vec::new());
        };
        let state = self
            .graph
            .try_get(key)
            .and_then(|node| node.publishing_state.clone());
        let rules: Vec<&AccessRule> = chain_rules
            .iter()
            .filter(|r| r.applies_to(state.as_deref()))
            .collect();

        let restricted = rules.iter().any(|r| r.right == AccessRight::RestrictRead);

        let mut roles = Vec::new();
        if !restricted {
            roles.push(PUBLIC_ROLE.to_string());
        }
        roles.extend(
            rules
                .iter()
                .filter(|r| r.right == AccessRight::GrantChange)
                .flat_map(|r| r.roles.iter().cloned()),
        );
        if restricted {
            roles.extend(
                rules
                    .iter()
                    .filter(|r| r.right == AccessRight::RestrictRead)
                    .flat_map(|r| r.roles.iter().cloned()),
            );
        }

        let mut seen = HashSet::new();
        roles.retain(|role| seen.insert(role.clone()));
        Ok(roles)
    }

    /// Own rules first, then inherited ones, nearest ancestor first, before
    /// any publishing-state filtering.
    fn effective_rules(
        &mut self,
        key: &NodeKey,
    ) -> Result<Option<Arc<Vec<AccessRule>>>, GraphError> {
        if let Some(rules) = self.memo.get(key) {
            return Ok(Some(rules.clone()));
        }
        let graph = self.graph.clone();
        let Some(node) = graph.try_get(key) else {
            return Ok(None);
        };

        // Walk up until a memoized ancestor or the top of the graph.
        let mut chain: Vec<&ContentNode> = vec![node];
        let mut visited = HashSet::from([&node.key]);
        let mut inherited: Arc<Vec<AccessRule>> = Arc::new(Vec::new());
        let mut current = node;
        while let Some(parent) = graph.parent(current) {
            if let Some(rules) = self.memo.get(&parent.key) {
                inherited = rules.clone();
                break;
            }
            if !visited.insert(&parent.key) {
                return Err(GraphError::Cycle {
                    key: parent.key.clone(),
                });
            }
            chain.push(parent);
            current = parent;
        }

        // Memoized lists stay unfiltered; publishing states are only checked
        // against the node being resolved.
        for level in chain.into_iter().rev() {
            let rules: Vec<AccessRule> = level
                .rules
                .iter()
                .chain(inherited.iter())
                .cloned()
                .collect();
            inherited = Arc::new(rules);
            self.memo.insert(level.key.clone(), inherited.clone());
        }

        Ok(Some(inherited))
    }
}
