//! Navigable content graph and its provider.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use portal_types::logical_names;

use crate::error::GraphError;
use crate::node::{ContentNode, NodeKey};

/// Immutable snapshot of the content graph.
#[derive(Debug, Default, Clone)]
pub struct ContentGraph {
    nodes: HashMap<NodeKey, ContentNode>,
}

/// Web pages below a root, as computed by
/// [`ContentGraph::web_page_descendants`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageSet {
    /// Root pages and (locale-matching) content pages.
    pub page_ids: Vec<String>,
    /// Root pages only.
    pub root_page_ids: Vec<String>,
}

impl ContentGraph {
    /// Build a graph from nodes, deriving child edges from parent edges.
    ///
    /// Children are listed in the order their nodes were supplied.
    pub fn from_nodes(nodes: impl IntoIterator<Item = ContentNode>) -> Self {
        let mut ordered: Vec<ContentNode> = nodes.into_iter().collect();
        for node in &mut ordered {
            node.children.clear();
        }

        let edges: Vec<(NodeKey, NodeKey)> = ordered
            .iter()
            .filter_map(|n| n.parent.clone().map(|p| (p, n.key.clone())))
            .collect();

        let mut nodes: HashMap<NodeKey, ContentNode> =
            ordered.into_iter().map(|n| (n.key.clone(), n)).collect();

        for (parent, child) in edges {
            match nodes.get_mut(&parent) {
                Some(node) => node.children.push(child),
                None => debug!(parent = %parent, child = %child, "Parent not in graph"),
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn try_get(&self, key: &NodeKey) -> Option<&ContentNode> {
        self.nodes.get(key)
    }

    pub fn parent(&self, node: &ContentNode) -> Option<&ContentNode> {
        node.parent.as_ref().and_then(|p| self.nodes.get(p))
    }

    pub fn children<'a>(&'a self, node: &'a ContentNode) -> impl Iterator<Item = &'a ContentNode> {
        node.children.iter().filter_map(|c| self.nodes.get(c))
    }

    /// Ancestors of `key`, nearest first. Stops at the first parent that is
    /// missing from the graph.
    pub fn ancestors(&self, key: &NodeKey) -> Result<Vec<&ContentNode>, GraphError> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([key.clone()]);
        let mut current = self.nodes.get(key);

        while let Some(node) = current.and_then(|n| self.parent(n)) {
            if !visited.insert(node.key.clone()) {
                return Err(GraphError::Cycle {
                    key: node.key.clone(),
                });
            }
            ancestors.push(node);
            current = Some(node);
        }
        Ok(ancestors)
    }

    /// All nodes below `key` in breadth-first order, excluding `key`.
    pub fn descendants(&self, key: &NodeKey) -> Vec<&ContentNode> {
        let mut out = Vec::new();
        let Some(root) = self.nodes.get(key) else {
            return out;
        };

        let mut visited = HashSet::from([key]);
        let mut queue: VecDeque<&ContentNode> = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            for child in self.children(node) {
                if visited.insert(&child.key) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }

    /// Web pages at and below `root`.
    ///
    /// Content pages whose language differs from `locale` are left out
    /// when a locale is given; root pages are always included.
    pub fn web_page_descendants(&self, root: &NodeKey, locale: Option<&str>) -> PageSet {
        let mut set = PageSet::default();
        let Some(root_node) = self.nodes.get(root) else {
            return set;
        };

        let pages = std::iter::once(root_node)
            .chain(self.descendants(root))
            .filter(|n| n.key.logical_name == logical_names::WEBPAGE);

        for page in pages {
            if page.is_root {
                set.root_page_ids.push(page.key.id.clone());
                set.page_ids.push(page.key.id.clone());
                continue;
            }
            let matches_locale = match (locale, page.language.as_deref()) {
                (Some(locale), Some(language)) => locale.eq_ignore_ascii_case(language),
                _ => true,
            };
            if matches_locale {
                set.page_ids.push(page.key.id.clone());
            }
        }
        set
    }

    /// Site-relative url of a node, built from the partial urls of the node
    /// and its ancestors.
    ///
    /// Returns `None` when the path cannot be built: a node without a
    /// partial url, a chain that does not end at a `/` home page, or a
    /// cycle. Content pages share the url of their root page.
    pub fn url_path(&self, key: &NodeKey) -> Option<String> {
        let node = self.nodes.get(key)?;
        let mut segments = Vec::new();
        let mut chain = vec![node];
        match self.ancestors(key) {
            Ok(ancestors) => chain.extend(ancestors),
            Err(e) => {
                warn!(key = %key, error = %e, "Cannot build url path");
                return None;
            }
        }

        let top = chain.last()?;
        if top.parent.is_some() {
            // The chain stopped at a parent missing from the graph.
            return None;
        }
        if top.partial_url.as_deref() != Some("/") {
            return None;
        }

        for node in chain.iter().rev().skip(1) {
            if !node.is_root {
                continue;
            }
            let segment = node.partial_url.as_deref()?.trim_matches('/');
            if segment.is_empty() {
                return None;
            }
            segments.push(segment);
        }

        if segments.is_empty() {
            Some("/".to_string())
        } else {
            Some(format!("/{}/", segments.join("/")))
        }
    }
}

/// Scoped, read-only access to a cached content graph.
pub trait ContentGraphProvider: Send + Sync {
    /// Current snapshot of the graph.
    fn graph(&self) -> Arc<ContentGraph>;
}

impl dyn ContentGraphProvider {
    /// Run `f` against one consistent snapshot.
    pub fn with_graph<R>(&self, f: impl FnOnce(&ContentGraph) -> R) -> R {
        let graph = self.graph();
        f(&graph)
    }
}

/// Provider over an in-process graph that can be swapped wholesale when the
/// cache is refreshed.
#[derive(Debug, Default)]
pub struct StaticGraphProvider {
    graph: RwLock<Arc<ContentGraph>>,
}

impl StaticGraphProvider {
    pub fn new(graph: ContentGraph) -> Self {
        Self {
            graph: RwLock::new(Arc::new(graph)),
        }
    }

    /// Replace the snapshot; readers holding the old one are unaffected.
    pub fn replace(&self, graph: ContentGraph) {
        let mut guard = self
            .graph
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(graph);
    }
}

impl ContentGraphProvider for StaticGraphProvider {
    fn graph(&self) -> Arc<ContentGraph> {
        self.graph
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page(id: &str) -> ContentNode {
        ContentNode::new(NodeKey::new(logical_names::WEBPAGE, id)).with_partial_url(id)
    }

    fn site() -> ContentGraph {
        let home = NodeKey::new(logical_names::WEBPAGE, "home");
        let about = NodeKey::new(logical_names::WEBPAGE, "about");
        ContentGraph::from_nodes(vec![
            ContentNode::new(home.clone()).with_partial_url("/"),
            page("about").with_parent(home.clone()),
            page("team").with_parent(about.clone()),
            ContentNode::new(NodeKey::new(logical_names::WEBPAGE, "about-fr"))
                .with_parent(about.clone())
                .as_content_page("fr"),
            ContentNode::new(NodeKey::new(logical_names::WEBPAGE, "about-en"))
                .with_parent(about.clone())
                .as_content_page("en"),
            ContentNode::new(NodeKey::new(logical_names::FORUM, "support"))
                .with_parent(about)
                .with_partial_url("support"),
        ])
    }

    #[test]
    fn test_children_follow_parent_edges() {
        let graph = site();
        let about = graph
            .try_get(&NodeKey::new(logical_names::WEBPAGE, "about"))
            .unwrap();
        let children: Vec<_> = graph.children(about).map(|c| c.key.id.as_str()).collect();
        assert_eq!(children, vec!["team", "about-fr", "about-en", "support"]);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let graph = site();
        let ancestors = graph
            .ancestors(&NodeKey::new(logical_names::WEBPAGE, "team"))
            .unwrap();
        let ids: Vec<_> = ancestors.iter().map(|n| n.key.id.as_str()).collect();
        assert_eq!(ids, vec!["about", "home"]);
    }

    #[test]
    fn test_ancestors_detects_cycle() {
        let a = NodeKey::new(logical_names::WEBPAGE, "a");
        let b = NodeKey::new(logical_names::WEBPAGE, "b");
        let graph = ContentGraph::from_nodes(vec![
            ContentNode::new(a.clone()).with_parent(b.clone()),
            ContentNode::new(b).with_parent(a.clone()),
        ]);
        assert!(matches!(graph.ancestors(&a), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_web_page_descendants() {
        let graph = site();
        let about = NodeKey::new(logical_names::WEBPAGE, "about");

        let all = graph.web_page_descendants(&about, None);
        assert_eq!(all.root_page_ids, vec!["about", "team"]);
        assert_eq!(all.page_ids, vec!["about", "team", "about-fr", "about-en"]);

        let french = graph.web_page_descendants(&about, Some("FR"));
        assert_eq!(french.root_page_ids, vec!["about", "team"]);
        assert_eq!(french.page_ids, vec!["about", "team", "about-fr"]);
    }

    #[test]
    fn test_web_page_descendants_of_missing_root() {
        let graph = site();
        let set = graph.web_page_descendants(&NodeKey::new(logical_names::WEBPAGE, "nope"), None);
        assert_eq!(set, PageSet::default());
    }

    #[test]
    fn test_url_path() {
        let graph = site();
        let path = |id: &str| graph.url_path(&NodeKey::new(logical_names::WEBPAGE, id));
        assert_eq!(path("home").as_deref(), Some("/"));
        assert_eq!(path("about").as_deref(), Some("/about/"));
        assert_eq!(path("team").as_deref(), Some("/about/team/"));
        assert_eq!(path("about-fr").as_deref(), Some("/about/"));
        assert_eq!(
            graph
                .url_path(&NodeKey::new(logical_names::FORUM, "support"))
                .as_deref(),
            Some("/about/support/")
        );
    }

    #[test]
    fn test_url_path_requires_home_root() {
        let orphan_parent = NodeKey::new(logical_names::WEBPAGE, "gone");
        let graph = ContentGraph::from_nodes(vec![page("orphan").with_parent(orphan_parent)]);
        assert_eq!(
            graph.url_path(&NodeKey::new(logical_names::WEBPAGE, "orphan")),
            None
        );
    }

    #[test]
    fn test_provider_snapshot_and_replace() {
        let provider: Arc<dyn ContentGraphProvider> = Arc::new(StaticGraphProvider::new(site()));
        let before = provider.with_graph(|g| g.len());
        assert_eq!(before, 6);

        let concrete = StaticGraphProvider::new(site());
        let snapshot = concrete.graph();
        concrete.replace(ContentGraph::default());
        assert!(concrete.graph().is_empty());
        assert_eq!(snapshot.len(), 6);
    }
}
