//! Per-type document streams over the result source.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use portal_query::{ConditionOperator, FilterKind, LinkEntity, QueryDefinition, QueryError};

use crate::aggregate::{AggregatedRecord, ResultAggregator};
use crate::error::IndexingError;
use crate::factory::{DocumentFactory, DocumentOutcome};
use crate::profile::EntityProfile;
use crate::source::ResultSource;

/// Restricts which records of a type an indexer yields.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFilter {
    /// Records with these primary keys.
    Ids(Vec<String>),
    /// Records whose root `attribute` is one of `values`.
    AttributeIn {
        attribute: String,
        values: Vec<String>,
    },
    /// Records reachable through `link` where `alias.attribute` is one of
    /// `values`. `alias` names `link` or one of its nested joins.
    Linked {
        link: LinkEntity,
        alias: String,
        attribute: String,
        values: Vec<String>,
    },
}

impl ScopeFilter {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScopeFilter::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn attribute_in(attribute: impl Into<String>, values: Vec<String>) -> Self {
        ScopeFilter::AttributeIn {
            attribute: attribute.into(),
            values,
        }
    }

    /// Restrict `definition` to this scope.
    pub fn apply(&self, definition: &QueryDefinition) -> Result<QueryDefinition, QueryError> {
        match self {
            ScopeFilter::Ids(ids) => Ok(definition.with_id_filter(ids.iter().cloned())),
            ScopeFilter::AttributeIn { attribute, values } => definition.with_filter_condition(
                FilterKind::And,
                attribute.clone(),
                ConditionOperator::In,
                values.clone(),
                None,
            ),
            ScopeFilter::Linked {
                link,
                alias,
                attribute,
                values,
            } => definition.with_link(link.clone()).with_filter_condition(
                FilterKind::And,
                attribute.clone(),
                ConditionOperator::In,
                values.clone(),
                Some(alias.as_str()),
            ),
        }
    }

    /// Primary keys when the scope is an id list.
    pub fn id_list(&self) -> Option<&[String]> {
        match self {
            ScopeFilter::Ids(ids) => Some(ids),
            _ => None,
        }
    }
}

/// Lazy, single-pass stream of document outcomes.
pub type DocumentIter<'a> = Box<dyn Iterator<Item = Result<DocumentOutcome, IndexingError>> + 'a>;

/// Produces the index documents of one entity type.
pub trait Indexer: Send + Sync {
    fn logical_name(&self) -> &str;

    /// Whether this indexer handles `logical_name` (case-insensitive).
    fn indexes(&self, logical_name: &str) -> bool {
        self.logical_name().eq_ignore_ascii_case(logical_name)
    }

    /// Documents of every record in `scope`, or of all records when unscoped.
    fn documents(&self, scope: Option<&ScopeFilter>) -> Result<DocumentIter<'_>, IndexingError>;
}

/// Indexer that fetches records page by page through a query definition.
pub struct FetchIndexer {
    profile: EntityProfile,
    definition: QueryDefinition,
    source: Arc<dyn ResultSource>,
    factory: Arc<DocumentFactory>,
}

impl FetchIndexer {
    /// The profile's attributes and joins are added to `definition`.
    pub fn new(
        profile: EntityProfile,
        definition: QueryDefinition,
        source: Arc<dyn ResultSource>,
        factory: Arc<DocumentFactory>,
    ) -> Result<Self, IndexingError> {
        if !definition
            .entity_name()
            .eq_ignore_ascii_case(&profile.logical_name)
        {
            return Err(IndexingError::Config(format!(
                "definition for {} cannot index {}",
                definition.entity_name(),
                profile.logical_name
            )));
        }

        let mut definition = definition.with_attributes(profile.required_attributes());
        for link in &profile.links {
            definition = definition.with_link(link.clone());
        }
        definition.validate()?;

        debug!(
            logical_name = %profile.logical_name,
            fields = definition.field_paths().len(),
            "Created indexer"
        );

        Ok(Self {
            profile,
            definition,
            source,
            factory,
        })
    }

    pub fn profile(&self) -> &EntityProfile {
        &self.profile
    }

    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }
}

impl Indexer for FetchIndexer {
    fn logical_name(&self) -> &str {
        &self.profile.logical_name
    }

    fn documents(&self, scope: Option<&ScopeFilter>) -> Result<DocumentIter<'_>, IndexingError> {
        let definition = match scope {
            Some(scope) => scope.apply(&self.definition)?,
            None => self.definition.clone(),
        };
        Ok(Box::new(DocumentStream::new(self, definition)))
    }
}

/// Fetch, aggregate and build one page at a time.
struct DocumentStream<'a> {
    indexer: &'a FetchIndexer,
    next_query: Option<QueryDefinition>,
    aggregator: ResultAggregator,
    pending: VecDeque<DocumentOutcome>,
    pages: u32,
    failed: bool,
}

impl<'a> DocumentStream<'a> {
    fn new(indexer: &'a FetchIndexer, definition: QueryDefinition) -> Self {
        Self {
            aggregator: ResultAggregator::new(definition.primary_key_attribute()),
            indexer,
            next_query: Some(definition),
            pending: VecDeque::new(),
            pages: 0,
            failed: false,
        }
    }

    fn build(&mut self, definition: &QueryDefinition, records: Vec<AggregatedRecord>) {
        if records.is_empty() {
            return;
        }
        let outcomes = self
            .indexer
            .factory
            .build_page(&self.indexer.profile, definition, records);
        self.pending.extend(outcomes);
    }
}

impl Iterator for DocumentStream<'_> {
    type Item = Result<DocumentOutcome, IndexingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(outcome) = self.pending.pop_front() {
                return Some(Ok(outcome));
            }
            if self.failed {
                return None;
            }

            let Some(query) = self.next_query.take() else {
                let carried = self.aggregator.finish()?;
                let definition = self.indexer.definition.clone();
                self.build(&definition, vec![carried]);
                continue;
            };

            let page = match self.indexer.source.execute(&query) {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        logical_name = %self.indexer.profile.logical_name,
                        page = query.page,
                        error = %e,
                        "Result page fetch failed"
                    );
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            };
            self.pages += 1;

            debug!(
                logical_name = %self.indexer.profile.logical_name,
                page = query.page,
                rows = page.rows.len(),
                more_records = page.more_records,
                "Fetched result page"
            );

            let records = self.aggregator.push_page(&page.rows, page.more_records);
            if page.more_records {
                self.next_query = Some(query.for_next_page(page.paging_cookie.as_deref()));
            } else {
                info!(
                    logical_name = %self.indexer.profile.logical_name,
                    pages = self.pages,
                    "Finished fetching records"
                );
            }
            self.build(&query, records);
        }
    }
}

/// Fetch indexers for every portal profile.
pub fn default_indexers(
    source: Arc<dyn ResultSource>,
    factory: Arc<DocumentFactory>,
    page_size: u32,
) -> Result<Vec<Box<dyn Indexer>>, IndexingError> {
    EntityProfile::portal_profiles()
        .into_iter()
        .map(|profile| {
            let definition = QueryDefinition::new(profile.logical_name.clone()).with_page_size(page_size);
            let indexer = FetchIndexer::new(profile, definition, source.clone(), factory.clone())?;
            Ok(Box::new(indexer) as Box<dyn Indexer>)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MockResultSource, ResultRow};
    use crate::text::MarkupStripper;
    use portal_graph::{ContentGraph, StaticGraphProvider};
    use portal_query::JoinKind;
    use portal_types::logical_names;

    fn factory() -> Arc<DocumentFactory> {
        Arc::new(DocumentFactory::new(
            Arc::new(StaticGraphProvider::new(ContentGraph::default())),
            Arc::new(MarkupStripper::new().unwrap()),
            "en",
        ))
    }

    fn thread(id: &str, forum: &str) -> ResultRow {
        ResultRow::new()
            .with_id("forumthreadid", id)
            .with_text("name", &format!("Thread {id}"))
            .with_id("forumid", forum)
    }

    fn thread_indexer(source: Arc<MockResultSource>, page_size: u32) -> FetchIndexer {
        let profile = EntityProfile::new(logical_names::FORUM_THREAD);
        let definition = QueryDefinition::new(logical_names::FORUM_THREAD)
            .with_attribute("forumid")
            .with_page_size(page_size);
        FetchIndexer::new(profile, definition, source, factory()).unwrap()
    }

    fn keys(indexer: &FetchIndexer, scope: Option<&ScopeFilter>) -> Vec<String> {
        indexer
            .documents(scope)
            .unwrap()
            .map(|o| o.unwrap().into_document().primary_key)
            .collect()
    }

    #[test]
    fn test_indexes_is_case_insensitive() {
        let indexer = thread_indexer(Arc::new(MockResultSource::new()), 10);
        assert!(indexer.indexes("ForumThread"));
        assert!(!indexer.indexes("forumpost"));
    }

    #[test]
    fn test_profile_fields_are_injected() {
        let indexer = thread_indexer(Arc::new(MockResultSource::new()), 10);
        let definition = indexer.definition();
        assert!(definition.contains_attribute("forumthreadid"));
        assert!(definition.contains_attribute("name"));
        assert!(definition.contains_attribute("forumid"));
    }

    #[test]
    fn test_mismatched_definition_is_rejected() {
        let result = FetchIndexer::new(
            EntityProfile::new("blog"),
            QueryDefinition::new("forum"),
            Arc::new(MockResultSource::new()),
            factory(),
        );
        assert!(matches!(result, Err(IndexingError::Config(_))));
    }

    #[test]
    fn test_streams_across_pages() {
        let source = Arc::new(MockResultSource::new());
        for i in 0..5 {
            source.insert("forumthread", thread(&format!("T{i}"), "F1"));
        }
        let indexer = thread_indexer(source.clone(), 2);

        assert_eq!(keys(&indexer, None), vec!["t0", "t1", "t2", "t3", "t4"]);
        assert_eq!(source.executed().len(), 3);
        assert_eq!(source.executed()[2].paging_cookie.as_deref(), Some("mock-page-2"));
    }

    #[test]
    fn test_stream_is_lazy() {
        let source = Arc::new(MockResultSource::new());
        for i in 0..4 {
            source.insert("forumthread", thread(&format!("T{i}"), "F1"));
        }
        let indexer = thread_indexer(source.clone(), 2);
        let mut stream = indexer.documents(None).unwrap();
        assert!(source.executed().is_empty());
        stream.next();
        assert_eq!(source.executed().len(), 1);
    }

    #[test]
    fn test_source_error_is_yielded_once() {
        let source = Arc::new(MockResultSource::new());
        for i in 0..4 {
            source.insert("forumthread", thread(&format!("T{i}"), "F1"));
        }
        source.fail_on_page("forumthread", 2);
        let indexer = thread_indexer(source, 2);

        let results: Vec<_> = indexer.documents(None).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(IndexingError::Source(_))));
    }

    #[test]
    fn test_scope_filters() {
        let source = Arc::new(MockResultSource::new());
        source.insert("forumthread", thread("T1", "F1"));
        source.insert("forumthread", thread("T2", "F2"));
        source.insert("forumthread", thread("T3", "F2"));
        source.insert(
            "forum",
            ResultRow::new()
                .with_id("forumid", "F2")
                .with_id("parentpageid", "P9"),
        );
        let indexer = thread_indexer(source, 10);

        assert_eq!(keys(&indexer, Some(&ScopeFilter::ids(["T3"]))), vec!["t3"]);
        assert_eq!(
            keys(
                &indexer,
                Some(&ScopeFilter::attribute_in("forumid", vec!["F1".into()]))
            ),
            vec!["t1"]
        );

        let linked = ScopeFilter::Linked {
            link: LinkEntity::new("forum", "forumid", "forumid")
                .with_alias("scopeforum")
                .with_link_type(JoinKind::Inner),
            alias: "scopeforum".into(),
            attribute: "parentpageid".into(),
            values: vec!["p9".into()],
        };
        assert_eq!(keys(&indexer, Some(&linked)), vec!["t2", "t3"]);
    }

    #[test]
    fn test_unknown_scope_alias_fails() {
        let indexer = thread_indexer(Arc::new(MockResultSource::new()), 10);
        let scope = ScopeFilter::Linked {
            link: LinkEntity::new("forum", "forumid", "forumid").with_alias("f"),
            alias: "missing".into(),
            attribute: "name".into(),
            values: vec![],
        };
        assert!(matches!(
            indexer.documents(Some(&scope)),
            Err(IndexingError::Query(QueryError::Lookup { .. }))
        ));
    }

    #[test]
    fn test_default_indexers_cover_portal_types() {
        let indexers = default_indexers(Arc::new(MockResultSource::new()), factory(), 100).unwrap();
        assert!(indexers.iter().any(|i| i.indexes(logical_names::WEBPAGE)));
        assert!(indexers.iter().any(|i| i.indexes(logical_names::FORUM_POST)));
        assert_eq!(indexers.len(), EntityProfile::portal_profiles().len());
    }
}
