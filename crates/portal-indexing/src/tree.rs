//! Cascading updates of a content subtree.
//!
//! A subtree update re-indexes a root record and everything hosted below
//! it, always parent type before child type. Pages are found through the
//! content graph; the content hosted on them is scoped by reference
//! attributes and joins so the result source does the matching.

use tracing::debug;

use portal_graph::{ContentGraph, NodeKey};
use portal_query::{JoinKind, LinkEntity};
use portal_types::{attributes, logical_names, primary_key_attribute};

use crate::indexer::ScopeFilter;

/// Join aliases used only to scope subtree queries.
const SCOPE_FORUM: &str = "scopeforum";
const SCOPE_THREAD: &str = "scopethread";
const SCOPE_BLOG: &str = "scopeblog";

/// One entity-set update of a subtree plan.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStep {
    pub logical_name: String,
    pub scope: ScopeFilter,
}

impl TreeStep {
    fn new(logical_name: &str, scope: ScopeFilter) -> Self {
        Self {
            logical_name: logical_name.to_string(),
            scope,
        }
    }
}

/// Inner join from a child type to its container, keyed by the container's
/// primary key.
fn container_link(container: &str, alias: &str) -> LinkEntity {
    let key = primary_key_attribute(container);
    LinkEntity::new(container, key.clone(), key)
        .with_alias(alias)
        .with_link_type(JoinKind::Inner)
}

/// Plans subtree updates over a content graph snapshot.
pub struct ContentTreeUpdater;

impl ContentTreeUpdater {
    /// Ordered steps re-indexing `root_id` and the content below it.
    ///
    /// `locale` filters language content pages of a web page root.
    pub fn plan(
        graph: &ContentGraph,
        root_type: &str,
        root_id: &str,
        locale: Option<&str>,
    ) -> Vec<TreeStep> {
        let root_type = root_type.to_ascii_lowercase();
        let steps = match root_type.as_str() {
            logical_names::WEBPAGE => Self::web_page_steps(graph, root_id, locale),
            logical_names::FORUM => Self::forum_steps(root_id),
            logical_names::IDEA_FORUM => {
                Self::container_steps(logical_names::IDEA_FORUM, logical_names::IDEA, root_id)
            }
            logical_names::ISSUE_FORUM => {
                Self::container_steps(logical_names::ISSUE_FORUM, logical_names::ISSUE, root_id)
            }
            logical_names::BLOG => {
                Self::container_steps(logical_names::BLOG, logical_names::BLOG_POST, root_id)
            }
            _ => vec![TreeStep::new(&root_type, ScopeFilter::ids([root_id]))],
        };
        debug!(
            root_type = %root_type,
            root_id,
            steps = steps.len(),
            "Planned content tree update"
        );
        steps
    }

    fn web_page_steps(graph: &ContentGraph, root_id: &str, locale: Option<&str>) -> Vec<TreeStep> {
        let root = NodeKey::new(logical_names::WEBPAGE, root_id);
        if graph.try_get(&root).is_none() {
            debug!(root = %root, "Root page not in content graph");
            return vec![TreeStep::new(
                logical_names::WEBPAGE,
                ScopeFilter::ids([root_id]),
            )];
        }

        let pages = graph.web_page_descendants(&root, locale);
        let mut steps = vec![TreeStep::new(
            logical_names::WEBPAGE,
            ScopeFilter::Ids(pages.page_ids),
        )];
        if pages.root_page_ids.is_empty() {
            return steps;
        }
        let roots = pages.root_page_ids;
        let hosted_by_roots = |link: LinkEntity, alias: &str| ScopeFilter::Linked {
            link,
            alias: alias.to_string(),
            attribute: attributes::PARENT_PAGE.to_string(),
            values: roots.clone(),
        };

        steps.push(TreeStep::new(
            logical_names::FORUM,
            ScopeFilter::attribute_in(attributes::PARENT_PAGE, roots.clone()),
        ));
        steps.push(TreeStep::new(
            logical_names::FORUM_THREAD,
            hosted_by_roots(container_link(logical_names::FORUM, SCOPE_FORUM), SCOPE_FORUM),
        ));
        steps.push(TreeStep::new(
            logical_names::FORUM_POST,
            hosted_by_roots(
                container_link(logical_names::FORUM_THREAD, SCOPE_THREAD)
                    .with_link(container_link(logical_names::FORUM, SCOPE_FORUM)),
                SCOPE_FORUM,
            ),
        ));
        steps.push(TreeStep::new(
            logical_names::BLOG,
            ScopeFilter::attribute_in(attributes::PARENT_PAGE, roots.clone()),
        ));
        steps.push(TreeStep::new(
            logical_names::BLOG_POST,
            hosted_by_roots(container_link(logical_names::BLOG, SCOPE_BLOG), SCOPE_BLOG),
        ));
        steps
    }

    fn forum_steps(root_id: &str) -> Vec<TreeStep> {
        let forum_key = primary_key_attribute(logical_names::FORUM);
        vec![
            TreeStep::new(logical_names::FORUM, ScopeFilter::ids([root_id])),
            TreeStep::new(
                logical_names::FORUM_THREAD,
                ScopeFilter::attribute_in(forum_key.clone(), vec![root_id.to_string()]),
            ),
            TreeStep::new(
                logical_names::FORUM_POST,
                ScopeFilter::Linked {
                    link: container_link(logical_names::FORUM_THREAD, SCOPE_THREAD),
                    alias: SCOPE_THREAD.to_string(),
                    attribute: forum_key,
                    values: vec![root_id.to_string()],
                },
            ),
        ]
    }

    fn container_steps(container: &str, child: &str, root_id: &str) -> Vec<TreeStep> {
        vec![
            TreeStep::new(container, ScopeFilter::ids([root_id])),
            TreeStep::new(
                child,
                ScopeFilter::attribute_in(primary_key_attribute(container), vec![root_id.to_string()]),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_graph::ContentNode;
    use pretty_assertions::assert_eq;

    fn names(steps: &[TreeStep]) -> Vec<&str> {
        steps.iter().map(|s| s.logical_name.as_str()).collect()
    }

    fn site() -> ContentGraph {
        let home = NodeKey::new(logical_names::WEBPAGE, "home");
        let docs = NodeKey::new(logical_names::WEBPAGE, "docs");
        ContentGraph::from_nodes(vec![
            ContentNode::new(home.clone()).with_partial_url("/"),
            ContentNode::new(docs.clone())
                .with_parent(home)
                .with_partial_url("docs"),
            ContentNode::new(NodeKey::new(logical_names::WEBPAGE, "docs-de"))
                .with_parent(docs.clone())
                .as_content_page("de"),
            ContentNode::new(NodeKey::new(logical_names::FORUM, "f1")).with_parent(docs),
        ])
    }

    #[test]
    fn test_web_page_plan_orders_parents_first() {
        let steps = ContentTreeUpdater::plan(&site(), "WebPage", "docs", None);
        assert_eq!(
            names(&steps),
            vec!["webpage", "forum", "forumthread", "forumpost", "blog", "blogpost"]
        );
        assert_eq!(
            steps[0].scope,
            ScopeFilter::Ids(vec!["docs".into(), "docs-de".into()])
        );
        assert_eq!(
            steps[1].scope,
            ScopeFilter::attribute_in("parentpageid", vec!["docs".into()])
        );
    }

    #[test]
    fn test_web_page_plan_filters_locale() {
        let steps = ContentTreeUpdater::plan(&site(), "webpage", "home", Some("fr"));
        assert_eq!(
            steps[0].scope,
            ScopeFilter::Ids(vec!["home".into(), "docs".into()])
        );
    }

    #[test]
    fn test_forum_post_scope_goes_through_thread_and_forum() {
        let steps = ContentTreeUpdater::plan(&site(), "webpage", "docs", None);
        let ScopeFilter::Linked { link, alias, .. } = &steps[3].scope else {
            panic!("expected linked scope");
        };
        assert_eq!(link.scope_name(), SCOPE_THREAD);
        assert_eq!(link.links[0].scope_name(), SCOPE_FORUM);
        assert_eq!(alias, SCOPE_FORUM);
    }

    #[test]
    fn test_missing_page_is_single_update() {
        let steps = ContentTreeUpdater::plan(&site(), "webpage", "gone", None);
        assert_eq!(
            steps,
            vec![TreeStep::new("webpage", ScopeFilter::ids(["gone"]))]
        );
    }

    #[test]
    fn test_content_page_root_has_no_hosted_content() {
        let steps = ContentTreeUpdater::plan(&site(), "webpage", "docs-de", None);
        assert_eq!(names(&steps), vec!["webpage"]);
    }

    #[test]
    fn test_container_roots() {
        let graph = ContentGraph::default();
        assert_eq!(
            names(&ContentTreeUpdater::plan(&graph, "forum", "F1", None)),
            vec!["forum", "forumthread", "forumpost"]
        );
        assert_eq!(
            names(&ContentTreeUpdater::plan(&graph, "ideaforum", "I1", None)),
            vec!["ideaforum", "idea"]
        );
        assert_eq!(
            names(&ContentTreeUpdater::plan(&graph, "issueforum", "I1", None)),
            vec!["issueforum", "issue"]
        );
        let blog = ContentTreeUpdater::plan(&graph, "blog", "B1", None);
        assert_eq!(names(&blog), vec!["blog", "blogpost"]);
        assert_eq!(
            blog[1].scope,
            ScopeFilter::attribute_in("blogid", vec!["B1".into()])
        );
    }

    #[test]
    fn test_other_type_is_single_update() {
        let steps = ContentTreeUpdater::plan(&ContentGraph::default(), "contact", "C1", None);
        assert_eq!(steps, vec![TreeStep::new("contact", ScopeFilter::ids(["C1"]))]);
    }
}
