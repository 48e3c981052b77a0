//! Index mutation operations.
//!
//! Every operation runs inside one [`WriteSession`]: the writer lock is
//! taken (with retry), the writes are made, and the session is committed.
//! An error anywhere rolls back what was not yet committed and is returned.
//!
//! Operations on a type without a registered indexer are logged no-ops.
//!
//! A session that releases the writer mid-operation commits several times.
//! Such sessions never delete a whole type up front: each fetched document
//! replaces its own key, and keys the fetch did not return are deleted only
//! after it finished cleanly. Every intermediate commit is then the old
//! state with some documents already replaced.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use portal_graph::ContentGraphProvider;
use portal_search::{entity_key, ContentIndex, IndexInspector};
use portal_types::Settings;

use crate::error::IndexingError;
use crate::indexer::{Indexer, ScopeFilter};
use crate::retry::LockRetryPolicy;
use crate::session::{MutationStats, WriteSession};
use crate::tree::ContentTreeUpdater;

/// Mutator configuration.
#[derive(Debug, Clone)]
pub struct MutatorConfig {
    /// Commit and release the writer after holding it this long; `None`
    /// keeps it for the whole operation.
    pub lock_release_interval: Option<Duration>,
    pub retry: LockRetryPolicy,
    /// Merge segments after a full build.
    pub compact_after_build: bool,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            lock_release_interval: Some(Duration::from_secs(30)),
            retry: LockRetryPolicy::default(),
            compact_after_build: true,
        }
    }
}

impl MutatorConfig {
    pub fn with_lock_release_interval(mut self, interval: Option<Duration>) -> Self {
        self.lock_release_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: LockRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_compact_after_build(mut self, compact: bool) -> Self {
        self.compact_after_build = compact;
        self
    }
}

impl From<&Settings> for MutatorConfig {
    fn from(settings: &Settings) -> Self {
        let interval = settings.lock.release_interval_secs;
        Self {
            lock_release_interval: (interval > 0).then(|| Duration::from_secs(interval)),
            retry: LockRetryPolicy::from(settings),
            compact_after_build: true,
        }
    }
}

/// Applies index mutations through the registered indexers.
pub struct IndexMutator {
    index: ContentIndex,
    indexers: Vec<Box<dyn Indexer>>,
    graph: Arc<dyn ContentGraphProvider>,
    config: MutatorConfig,
}

impl IndexMutator {
    pub fn new(
        index: ContentIndex,
        graph: Arc<dyn ContentGraphProvider>,
        config: MutatorConfig,
    ) -> Self {
        Self {
            index,
            indexers: Vec::new(),
            graph,
            config,
        }
    }

    /// Register an indexer.
    pub fn register(&mut self, indexer: Box<dyn Indexer>) {
        info!(logical_name = %indexer.logical_name(), "Registered indexer");
        self.indexers.push(indexer);
    }

    pub fn with_indexers(mut self, indexers: Vec<Box<dyn Indexer>>) -> Self {
        for indexer in indexers {
            self.register(indexer);
        }
        self
    }

    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    /// Logical names of registered indexers.
    pub fn indexer_names(&self) -> Vec<&str> {
        self.indexers.iter().map(|i| i.logical_name()).collect()
    }

    fn indexers_for(&self, logical_name: &str) -> Vec<&dyn Indexer> {
        self.indexers
            .iter()
            .filter(|i| i.indexes(logical_name))
            .map(|i| i.as_ref())
            .collect()
    }

    fn is_indexed(&self, operation: &str, logical_name: &str) -> bool {
        let indexed = self.indexers.iter().any(|i| i.indexes(logical_name));
        if !indexed {
            info!(operation, logical_name, "No indexer registered, skipping");
        }
        indexed
    }

    /// Rebuild the whole index from every registered indexer.
    pub fn build(&self) -> Result<MutationStats, IndexingError> {
        self.run("build", self.config.compact_after_build, |session| {
            let incremental = session.releases_lock();
            if !incremental {
                session.delete_all()?;
            }
            let mut seen = HashSet::new();
            for indexer in &self.indexers {
                self.add_documents(session, indexer.as_ref(), None, incremental, &mut seen)?;
            }
            if incremental {
                let stale = self.committed_keys(None)?;
                self.delete_unseen(session, stale, &seen)?;
            }
            Ok(())
        })
    }

    /// Remove one record's document.
    pub fn delete_entity(&self, logical_name: &str, id: &str) -> Result<MutationStats, IndexingError> {
        if !self.is_indexed("delete_entity", logical_name) {
            return Ok(MutationStats::new());
        }
        self.run("delete_entity", false, |session| {
            session.delete_entity(logical_name, id)
        })
    }

    /// Remove every document of a type.
    pub fn delete_entity_set(&self, logical_name: &str) -> Result<MutationStats, IndexingError> {
        if !self.is_indexed("delete_entity_set", logical_name) {
            return Ok(MutationStats::new());
        }
        self.run("delete_entity_set", false, |session| {
            session.delete_type(logical_name)
        })
    }

    /// Re-index one record. A record gone from the source ends up deleted.
    pub fn update_entity(&self, logical_name: &str, id: &str) -> Result<MutationStats, IndexingError> {
        if !self.is_indexed("update_entity", logical_name) {
            return Ok(MutationStats::new());
        }
        let scope = ScopeFilter::ids([id]);
        self.run("update_entity", false, |session| {
            self.update_in_session(session, logical_name, Some(&scope))
        })
    }

    /// Re-index every record of a type, or those in `scope`.
    pub fn update_entity_set(
        &self,
        logical_name: &str,
        scope: Option<&ScopeFilter>,
    ) -> Result<MutationStats, IndexingError> {
        if !self.is_indexed("update_entity_set", logical_name) {
            return Ok(MutationStats::new());
        }
        self.run("update_entity_set", false, |session| {
            self.update_in_session(session, logical_name, scope)
        })
    }

    /// Re-index a record and the content hosted below it.
    pub fn update_content_tree(
        &self,
        root_type: &str,
        root_id: &str,
        locale: Option<&str>,
    ) -> Result<MutationStats, IndexingError> {
        let graph = self.graph.graph();
        let steps: Vec<_> = ContentTreeUpdater::plan(&graph, root_type, root_id, locale)
            .into_iter()
            .filter(|step| self.is_indexed("update_content_tree", &step.logical_name))
            .collect();
        if steps.is_empty() {
            return Ok(MutationStats::new());
        }

        self.run("update_content_tree", false, |session| {
            for step in &steps {
                self.update_in_session(session, &step.logical_name, Some(&step.scope))?;
            }
            Ok(())
        })
    }

    /// Delete then re-add.
    ///
    /// In a single-commit session unscoped updates drop the whole type and
    /// id scopes drop those keys up front. Otherwise each fetched document
    /// replaces its previous version, and for unscoped or id updates the
    /// keys not fetched are deleted at the end. Other scopes cannot be
    /// enumerated before fetching, so only fetched documents are replaced.
    fn update_in_session(
        &self,
        session: &mut WriteSession<'_>,
        logical_name: &str,
        scope: Option<&ScopeFilter>,
    ) -> Result<(), IndexingError> {
        let incremental = session.releases_lock();
        let replace_each = match scope {
            None if !incremental => {
                session.delete_type(logical_name)?;
                false
            }
            Some(ScopeFilter::Ids(ids)) if !incremental => {
                for id in ids {
                    session.delete_entity(logical_name, id)?;
                }
                false
            }
            _ => true,
        };

        let mut seen = HashSet::new();
        for indexer in self.indexers_for(logical_name) {
            self.add_documents(session, indexer, scope, replace_each, &mut seen)?;
        }

        if incremental {
            let expected = match scope {
                None => self.committed_keys(Some(logical_name))?,
                Some(ScopeFilter::Ids(ids)) => ids
                    .iter()
                    .map(|id| (logical_name.to_string(), id.clone()))
                    .collect(),
                Some(_) => Vec::new(),
            };
            self.delete_unseen(session, expected, &seen)?;
        }
        Ok(())
    }

    /// Committed `(type, key)` pairs, all types when `logical_name` is `None`.
    fn committed_keys(
        &self,
        logical_name: Option<&str>,
    ) -> Result<Vec<(String, String)>, IndexingError> {
        Ok(IndexInspector::new(&self.index)?.entity_keys(logical_name)?)
    }

    fn delete_unseen(
        &self,
        session: &mut WriteSession<'_>,
        keys: Vec<(String, String)>,
        seen: &HashSet<String>,
    ) -> Result<(), IndexingError> {
        let mut deleted = 0usize;
        for (logical_name, key) in keys {
            if !seen.contains(&entity_key(&logical_name, &key)) {
                session.delete_entity(&logical_name, &key)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            debug!(deleted, "Deleted records no longer returned by the source");
        }
        Ok(())
    }

    fn add_documents(
        &self,
        session: &mut WriteSession<'_>,
        indexer: &dyn Indexer,
        scope: Option<&ScopeFilter>,
        replace_each: bool,
        seen: &mut HashSet<String>,
    ) -> Result<(), IndexingError> {
        for outcome in indexer.documents(scope)? {
            let outcome = outcome?;
            let partial = outcome.is_partial();
            if partial {
                for error in outcome.errors() {
                    warn!(
                        key = %outcome.document().entity_key(),
                        error = %error,
                        "Indexing partial document"
                    );
                }
            }
            let document = outcome.into_document();
            seen.insert(document.entity_key());
            if replace_each {
                session.delete_entity(&document.logical_name, &document.primary_key)?;
            }
            session.add(&document, partial)?;
            if session.relock_if_due()? {
                debug!(logical_name = %indexer.logical_name(), "Resumed after lock release");
            }
        }
        Ok(())
    }

    fn run(
        &self,
        operation: &'static str,
        compact: bool,
        writes: impl FnOnce(&mut WriteSession<'_>) -> Result<(), IndexingError>,
    ) -> Result<MutationStats, IndexingError> {
        let started = Instant::now();
        info!(operation, "Index mutation started");

        let mut session = WriteSession::open(
            &self.index,
            &self.config.retry,
            self.config.lock_release_interval,
        )?;
        if let Err(e) = writes(&mut session) {
            warn!(operation, error = %e, "Index mutation failed");
            // Dropping the session rolls back the open batch.
            drop(session);
            return Err(e);
        }
        let stats = if compact {
            session.commit_and_compact()?
        } else {
            session.commit()?
        };

        info!(
            operation,
            added = stats.added,
            deleted_terms = stats.deleted_terms,
            partial = stats.partial,
            batches = stats.batches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Index mutation complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::DocumentFactory;
    use crate::indexer::FetchIndexer;
    use crate::profile::EntityProfile;
    use crate::source::{MockResultSource, ResultRow};
    use crate::text::MarkupStripper;
    use portal_graph::{ContentGraph, StaticGraphProvider};
    use portal_query::QueryDefinition;
    use portal_search::{ContentIndexConfig, IndexInspector};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: Arc<MockResultSource>,
        mutator: IndexMutator,
    }

    fn fixture(types: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let index = ContentIndex::open_or_create(ContentIndexConfig::new(dir.path())).unwrap();
        let graph: Arc<dyn ContentGraphProvider> =
            Arc::new(StaticGraphProvider::new(ContentGraph::default()));
        let factory = Arc::new(DocumentFactory::new(
            graph.clone(),
            Arc::new(MarkupStripper::new().unwrap()),
            "en",
        ));
        let source = Arc::new(MockResultSource::new());
        let mut mutator = IndexMutator::new(
            index,
            graph,
            MutatorConfig::default().with_compact_after_build(false),
        );
        for name in types {
            let indexer = FetchIndexer::new(
                EntityProfile::new(*name),
                QueryDefinition::new(*name).with_page_size(2),
                source.clone(),
                factory.clone(),
            )
            .unwrap();
            mutator.register(Box::new(indexer));
        }
        Fixture {
            _dir: dir,
            source,
            mutator,
        }
    }

    fn contact(id: &str, name: &str) -> ResultRow {
        ResultRow::new()
            .with_id("contactid", id)
            .with_text("name", name)
    }

    fn inspector(fixture: &Fixture) -> IndexInspector {
        IndexInspector::new(fixture.mutator.index()).unwrap()
    }

    #[test]
    fn test_build_indexes_all_types() {
        let f = fixture(&["contact", "account"]);
        f.source.insert("contact", contact("C1", "Ada"));
        f.source.insert("contact", contact("C2", "Grace"));
        f.source.insert("account", ResultRow::new().with_id("accountid", "A1"));

        let stats = f.mutator.build().unwrap();
        assert_eq!(stats.added, 3);
        assert_eq!(inspector(&f).count_type("contact").unwrap(), 2);
        assert_eq!(inspector(&f).count_type("account").unwrap(), 1);

        f.source.remove("contact", "C2");
        f.mutator.build().unwrap();
        assert_eq!(inspector(&f).primary_keys("contact").unwrap(), vec!["c1"]);
    }

    #[test]
    fn test_update_entity_is_idempotent() {
        let f = fixture(&["contact"]);
        f.source.insert("contact", contact("C1", "Ada"));
        f.mutator.update_entity("contact", "C1").unwrap();
        f.mutator.update_entity("contact", "{C1}").unwrap();
        assert_eq!(inspector(&f).count_entity("contact", "c1").unwrap(), 1);
    }

    #[test]
    fn test_update_entity_removes_vanished_record() {
        let f = fixture(&["contact"]);
        f.source.insert("contact", contact("C1", "Ada"));
        f.mutator.update_entity("contact", "C1").unwrap();
        f.source.remove("contact", "C1");
        let stats = f.mutator.update_entity("contact", "C1").unwrap();
        assert_eq!(stats.added, 0);
        assert_eq!(stats.deleted_terms, 1);
        assert_eq!(inspector(&f).num_docs().unwrap(), 0);
    }

    #[test]
    fn test_unregistered_type_is_noop() {
        let f = fixture(&["forumthread"]);
        let stats = f.mutator.delete_entity_set("forumpost").unwrap();
        assert_eq!(stats, MutationStats::new());
        assert!(f.source.executed().is_empty());
    }

    #[test]
    fn test_delete_entity_and_set() {
        let f = fixture(&["contact"]);
        f.source.insert("contact", contact("C1", "Ada"));
        f.source.insert("contact", contact("C2", "Grace"));
        f.mutator.update_entity_set("contact", None).unwrap();

        f.mutator.delete_entity("contact", "C1").unwrap();
        assert_eq!(inspector(&f).primary_keys("contact").unwrap(), vec!["c2"]);

        f.mutator.delete_entity_set("CONTACT").unwrap();
        assert_eq!(inspector(&f).count_type("contact").unwrap(), 0);
    }

    #[test]
    fn test_scoped_set_update_replaces_matching() {
        let f = fixture(&["contact"]);
        f.source.insert("contact", contact("C1", "Ada").with_id("parentcustomerid", "A1"));
        f.source.insert("contact", contact("C2", "Grace").with_id("parentcustomerid", "A2"));
        f.mutator.update_entity_set("contact", None).unwrap();

        f.source.replace(
            "contact",
            "C1",
            contact("C1", "Ada Lovelace").with_id("parentcustomerid", "A1"),
        );
        let scope = ScopeFilter::attribute_in("parentcustomerid", vec!["A1".into()]);
        let stats = f.mutator.update_entity_set("contact", Some(&scope)).unwrap();

        assert_eq!(stats.added, 1);
        let inspector = inspector(&f);
        assert_eq!(inspector.count_type("contact").unwrap(), 2);
        assert_eq!(
            inspector.stored("contact", "c1").unwrap().unwrap().title.as_deref(),
            Some("Ada Lovelace")
        );
    }

    #[test]
    fn test_source_failure_rolls_back() {
        let f = fixture(&["contact"]);
        for i in 0..4 {
            f.source.insert("contact", contact(&format!("C{i}"), "x"));
        }
        f.mutator.update_entity_set("contact", None).unwrap();

        f.source.fail_on_page("contact", 2);
        let result = f.mutator.update_entity_set("contact", None);
        assert!(matches!(result, Err(IndexingError::Source(_))));
        assert_eq!(inspector(&f).count_type("contact").unwrap(), 4);
    }

    #[test]
    fn test_release_interval_splits_batches() {
        let mut f = fixture(&["contact"]);
        f.mutator.config = MutatorConfig::default()
            .with_lock_release_interval(Some(Duration::ZERO))
            .with_compact_after_build(false);
        for i in 0..3 {
            f.source.insert("contact", contact(&format!("C{i}"), "x"));
        }
        let stats = f.mutator.update_entity_set("contact", None).unwrap();
        assert_eq!(stats.added, 3);
        assert_eq!(stats.batches, 4);
    }

    fn releasing(types: &[&str]) -> Fixture {
        let mut f = fixture(types);
        f.mutator.config = MutatorConfig::default()
            .with_lock_release_interval(Some(Duration::ZERO))
            .with_compact_after_build(false);
        f
    }

    #[test]
    fn test_failure_after_release_keeps_every_record() {
        let f = releasing(&["contact"]);
        for i in 0..6 {
            f.source.insert("contact", contact(&format!("C{i}"), "old"));
        }
        f.mutator.update_entity_set("contact", None).unwrap();
        for i in 0..6 {
            let id = format!("C{i}");
            f.source.replace("contact", &id, contact(&id, "new"));
        }

        f.source.fail_on_page("contact", 2);
        let result = f.mutator.update_entity_set("contact", None);
        assert!(matches!(result, Err(IndexingError::Source(_))));

        let inspector = inspector(&f);
        assert_eq!(inspector.count_type("contact").unwrap(), 6);
        for i in 0..6 {
            assert_eq!(
                inspector.count_entity("contact", &format!("c{i}")).unwrap(),
                1
            );
        }
        // The first page was committed before the failure, the rest kept.
        let title = |key: &str| inspector.stored("contact", key).unwrap().unwrap().title;
        assert_eq!(title("c0").as_deref(), Some("new"));
        assert_eq!(title("c5").as_deref(), Some("old"));
    }

    #[test]
    fn test_build_failure_after_release_keeps_other_types() {
        let f = releasing(&["account", "contact"]);
        f.source.insert("account", ResultRow::new().with_id("accountid", "A1"));
        for i in 0..4 {
            f.source.insert("contact", contact(&format!("C{i}"), "x"));
        }
        f.mutator.build().unwrap();

        f.source.fail_on_page("contact", 2);
        assert!(f.mutator.build().is_err());
        assert_eq!(inspector(&f).count_type("account").unwrap(), 1);
        assert_eq!(inspector(&f).count_type("contact").unwrap(), 4);
    }

    #[test]
    fn test_released_update_deletes_vanished_records_at_end() {
        let f = releasing(&["contact"]);
        for i in 0..3 {
            f.source.insert("contact", contact(&format!("C{i}"), "x"));
        }
        f.mutator.update_entity_set("contact", None).unwrap();

        f.source.remove("contact", "C1");
        f.mutator.update_entity_set("contact", None).unwrap();
        assert_eq!(
            inspector(&f).primary_keys("contact").unwrap(),
            vec!["c0", "c2"]
        );

        f.source.remove("contact", "C2");
        f.mutator.update_entity("contact", "C2").unwrap();
        assert_eq!(inspector(&f).primary_keys("contact").unwrap(), vec!["c0"]);

        f.source.insert("account", ResultRow::new().with_id("accountid", "A1"));
        f.mutator.build().unwrap();
        assert_eq!(inspector(&f).primary_keys("contact").unwrap(), vec!["c0"]);
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.lock.release_interval_secs = 0;
        assert_eq!(MutatorConfig::from(&settings).lock_release_interval, None);
        settings.lock.release_interval_secs = 5;
        assert_eq!(
            MutatorConfig::from(&settings).lock_release_interval,
            Some(Duration::from_secs(5))
        );
    }
}
