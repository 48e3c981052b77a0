//! End-to-end test infrastructure for the portal indexer.
//!
//! Provides a shared TestHarness (temp index, in-memory result source,
//! fixture content graph) and record builders for the scenario tests.

use std::sync::Arc;
use std::time::Duration;

use portal_graph::{
    AccessRight, AccessRule, ContentGraph, ContentGraphProvider, ContentNode, NodeKey,
    StaticGraphProvider,
};
use portal_indexing::{
    DocumentFactory, EntityProfile, FetchIndexer, IndexMutator, LockRetryPolicy, MarkupStripper,
    MockResultSource, MutatorConfig, ResultRow,
};
use portal_query::QueryDefinition;
use portal_search::{ContentIndex, ContentIndexConfig, IndexInspector};
use portal_types::{logical_names, AttributeType, FieldValue, TypedValue};

/// Page size used by harness indexers, small enough to exercise paging.
pub const TEST_PAGE_SIZE: u32 = 2;

/// Free-text body attribute of fixture web pages.
pub const PAGE_COPY: &str = "copy";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub index: ContentIndex,
    pub source: Arc<MockResultSource>,
    pub graph: Arc<StaticGraphProvider>,
    pub factory: Arc<DocumentFactory>,
}

impl TestHarness {
    /// Harness over [`fixture_graph`].
    pub fn new() -> Self {
        Self::with_graph(fixture_graph())
    }

    pub fn with_graph(graph: ContentGraph) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index = ContentIndex::open_or_create(ContentIndexConfig::new(
            temp_dir.path().join("content-index"),
        ))
        .expect("Failed to open content index");

        let graph = Arc::new(StaticGraphProvider::new(graph));
        let provider: Arc<dyn ContentGraphProvider> = graph.clone();
        let factory = Arc::new(DocumentFactory::new(
            provider,
            Arc::new(MarkupStripper::new().expect("Failed to build markup stripper")),
            "en-US",
        ));

        Self {
            _temp_dir: temp_dir,
            index,
            source: Arc::new(MockResultSource::new()),
            graph,
            factory,
        }
    }

    /// Retry policy short enough for tests yet patient with a busy writer.
    pub fn retry_policy() -> LockRetryPolicy {
        LockRetryPolicy::default()
            .with_max_attempts(50)
            .with_intervals(Duration::from_millis(5), Duration::from_millis(50))
    }

    /// Mutator with indexers for `types`, using portal profiles where known.
    pub fn mutator(&self, types: &[&str]) -> IndexMutator {
        self.mutator_with(
            MutatorConfig::default().with_retry(Self::retry_policy()),
            types,
        )
    }

    pub fn mutator_with(&self, config: MutatorConfig, types: &[&str]) -> IndexMutator {
        let mut mutator = IndexMutator::new(self.index.clone(), self.graph.clone(), config);
        for name in types {
            mutator.register(Box::new(self.indexer(profile_for(name))));
        }
        mutator
    }

    /// Mutator indexing every portal type.
    pub fn portal_mutator(&self) -> IndexMutator {
        let names: Vec<String> = EntityProfile::portal_profiles()
            .into_iter()
            .map(|p| p.logical_name)
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.mutator(&names)
    }

    pub fn indexer(&self, profile: EntityProfile) -> FetchIndexer {
        let mut definition = QueryDefinition::new(profile.logical_name.clone());
        if profile.logical_name == logical_names::WEBPAGE {
            definition = definition.with_attribute(PAGE_COPY);
        }
        self.indexer_with(profile, definition)
    }

    pub fn indexer_with(&self, profile: EntityProfile, definition: QueryDefinition) -> FetchIndexer {
        FetchIndexer::new(
            profile,
            definition.with_page_size(TEST_PAGE_SIZE),
            self.source.clone(),
            self.factory.clone(),
        )
        .expect("Failed to create indexer")
    }

    pub fn inspector(&self) -> IndexInspector {
        IndexInspector::new(&self.index).expect("Failed to open index inspector")
    }

    /// Entity names of executed queries with consecutive repeats collapsed.
    pub fn query_sequence(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .source
            .executed()
            .iter()
            .map(|q| q.entity_name().to_string())
            .collect();
        names.dedup();
        names
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Portal profile for `name`, or a public profile for other types.
pub fn profile_for(name: &str) -> EntityProfile {
    EntityProfile::portal_profiles()
        .into_iter()
        .find(|p| p.logical_name.eq_ignore_ascii_case(name))
        .unwrap_or_else(|| EntityProfile::new(name))
}

fn page_key(id: &str) -> NodeKey {
    NodeKey::new(logical_names::WEBPAGE, id)
}

/// Site used by the scenario tests.
///
/// ```text
/// home (/)
/// +-- support                 forum "community"
/// |   +-- support-en, support-fr (content pages)
/// |   +-- faq
/// +-- members (restricted to "members")
/// |   forum "private", blog "news"
/// +-- about
///     forum "offtopic"
/// ```
pub fn fixture_graph() -> ContentGraph {
    ContentGraph::from_nodes(vec![
        ContentNode::new(page_key("home"))
            .with_partial_url("/")
            .with_rule(AccessRule::new("editors", AccessRight::GrantChange, &["editors"])),
        ContentNode::new(page_key("support"))
            .with_parent(page_key("home"))
            .with_partial_url("support"),
        ContentNode::new(page_key("support-en"))
            .with_parent(page_key("support"))
            .as_content_page("en-US"),
        ContentNode::new(page_key("support-fr"))
            .with_parent(page_key("support"))
            .as_content_page("fr-FR"),
        ContentNode::new(page_key("faq"))
            .with_parent(page_key("support"))
            .with_partial_url("faq"),
        ContentNode::new(page_key("members"))
            .with_parent(page_key("home"))
            .with_partial_url("members")
            .with_rule(AccessRule::new(
                "members only",
                AccessRight::RestrictRead,
                &["members"],
            )),
        ContentNode::new(page_key("about"))
            .with_parent(page_key("home"))
            .with_partial_url("about"),
        ContentNode::new(NodeKey::new(logical_names::FORUM, "community"))
            .with_parent(page_key("support")),
        ContentNode::new(NodeKey::new(logical_names::FORUM, "private"))
            .with_parent(page_key("members")),
        ContentNode::new(NodeKey::new(logical_names::FORUM, "offtopic"))
            .with_parent(page_key("about")),
        ContentNode::new(NodeKey::new(logical_names::BLOG, "news"))
            .with_parent(page_key("members")),
    ])
}

pub fn webpage_row(id: &str, name: &str, parent: Option<&str>) -> ResultRow {
    let mut row = ResultRow::new()
        .with_id("webpageid", id)
        .with_text("name", name)
        .with_text(PAGE_COPY, &format!("<p>{name} page copy</p>"))
        .with_id("websiteid", "site");
    if let Some(parent) = parent {
        row = row.with_id("parentpageid", parent);
    }
    row
}

/// Content page row in `language_code` with an LCID language id.
pub fn content_page_row(id: &str, name: &str, root: &str, language_code: &str, lcid: i64) -> ResultRow {
    webpage_row(id, name, Some(root))
        .with_text("languagecode", language_code)
        .with(
            "languageid",
            TypedValue::new(FieldValue::Integer(lcid), AttributeType::Integer),
        )
}

pub fn forum_row(id: &str, name: &str, parent_page: &str) -> ResultRow {
    ResultRow::new()
        .with_id("forumid", id)
        .with_text("name", name)
        .with_id("parentpageid", parent_page)
        .with_id("websiteid", "site")
}

pub fn thread_row(id: &str, name: &str, forum: &str) -> ResultRow {
    ResultRow::new()
        .with_id("forumthreadid", id)
        .with_text("name", name)
        .with_id("forumid", forum)
        .with_id("websiteid", "site")
}

pub fn post_row(id: &str, name: &str, thread: &str) -> ResultRow {
    ResultRow::new()
        .with_id("forumpostid", id)
        .with_text("name", name)
        .with_id("forumthreadid", thread)
        .with_id("websiteid", "site")
}

pub fn blog_row(id: &str, name: &str, parent_page: &str) -> ResultRow {
    ResultRow::new()
        .with_id("blogid", id)
        .with_text("name", name)
        .with_id("parentpageid", parent_page)
}

pub fn blog_post_row(id: &str, title: &str, blog: &str) -> ResultRow {
    ResultRow::new()
        .with_id("blogpostid", id)
        .with_text("title", title)
        .with_id("blogid", blog)
}

/// Records matching [`fixture_graph`], plus content hosted on its pages.
pub fn seed_site(source: &MockResultSource) {
    use logical_names::*;

    source.insert(WEBPAGE, webpage_row("home", "Home", None));
    source.insert(WEBPAGE, webpage_row("support", "Support", Some("home")));
    source.insert(
        WEBPAGE,
        content_page_row("support-en", "Support running help", "support", "en-US", 1033),
    );
    source.insert(
        WEBPAGE,
        content_page_row("support-fr", "Assistance", "support", "fr-FR", 1036),
    );
    source.insert(WEBPAGE, webpage_row("faq", "Questions", Some("support")));
    source.insert(WEBPAGE, webpage_row("members", "Members", Some("home")));
    source.insert(WEBPAGE, webpage_row("about", "About", Some("home")));

    source.insert(FORUM, forum_row("community", "Community", "support"));
    source.insert(FORUM, forum_row("private", "Private", "members"));
    source.insert(FORUM, forum_row("offtopic", "Off topic", "about"));

    source.insert(FORUM_THREAD, thread_row("t-install", "Installing", "community"));
    source.insert(FORUM_THREAD, thread_row("t-billing", "Billing", "community"));
    source.insert(FORUM_THREAD, thread_row("t-secret", "Roadmap", "private"));
    source.insert(FORUM_THREAD, thread_row("t-chat", "Weekend", "offtopic"));

    source.insert(FORUM_POST, post_row("p-1", "Cannot install", "t-install"));
    source.insert(FORUM_POST, post_row("p-2", "Try again", "t-install"));
    source.insert(FORUM_POST, post_row("p-3", "Invoice missing", "t-billing"));
    source.insert(FORUM_POST, post_row("p-4", "Next quarter", "t-secret"));
    source.insert(FORUM_POST, post_row("p-5", "Hiking", "t-chat"));

    source.insert(BLOG, blog_row("news", "News", "members"));
    source.insert(BLOG_POST, blog_post_row("b-1", "Launch day", "news"));
}
