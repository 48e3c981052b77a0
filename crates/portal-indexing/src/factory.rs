//! Turns aggregated records into index documents.
//!
//! Field values are encoded by declared attribute type:
//! - identifiers and references become canonical ids, references also get a
//!   `<field>.name` field;
//! - dates are stored as RFC 3339 plus `.date`, `.year`, `.month`, `.day`;
//! - free text is normalized into the content blob and kept exact when short;
//! - everything else is stored as its display string.
//!
//! Failures are collected per document. A document with errors is still
//! returned as [`DocumentOutcome::Partial`] so the batch can index it.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, warn};

use portal_graph::{ContentGraph, ContentGraphProvider, NodeKey, RoleResolver};
use portal_query::QueryDefinition;
use portal_search::{Analyzer, IndexDocument};
use portal_types::{logical_names, FieldValue, PUBLIC_ROLE};

use crate::aggregate::{AggregatedRecord, AggregatedValue, VALUE_DELIMITER};
use crate::error::DocumentBuildError;
use crate::profile::{AccessSource, EntityProfile, UrlTracking};
use crate::text::TextNormalizer;

/// Free text longer than this only goes into the content blob.
pub const MAX_EXACT_TEXT_CHARS: usize = 256;

/// Result of building one document.
#[derive(Debug)]
pub enum DocumentOutcome {
    Complete(IndexDocument),
    Partial {
        document: IndexDocument,
        errors: Vec<DocumentBuildError>,
    },
}

impl DocumentOutcome {
    pub fn document(&self) -> &IndexDocument {
        match self {
            DocumentOutcome::Complete(document) => document,
            DocumentOutcome::Partial { document, .. } => document,
        }
    }

    pub fn into_document(self) -> IndexDocument {
        match self {
            DocumentOutcome::Complete(document) => document,
            DocumentOutcome::Partial { document, .. } => document,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, DocumentOutcome::Partial { .. })
    }

    pub fn errors(&self) -> &[DocumentBuildError] {
        match self {
            DocumentOutcome::Complete(_) => &[],
            DocumentOutcome::Partial { errors, .. } => errors,
        }
    }
}

/// Builds index documents against a content graph snapshot.
pub struct DocumentFactory {
    graph: Arc<dyn ContentGraphProvider>,
    normalizer: Arc<dyn TextNormalizer>,
    default_language: String,
}

impl DocumentFactory {
    pub fn new(
        graph: Arc<dyn ContentGraphProvider>,
        normalizer: Arc<dyn TextNormalizer>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            normalizer,
            default_language: default_language.into(),
        }
    }

    pub fn graph_provider(&self) -> &Arc<dyn ContentGraphProvider> {
        &self.graph
    }

    /// Build documents for one page of records.
    ///
    /// The whole page sees one graph snapshot and shares one role memo.
    pub fn build_page(
        &self,
        profile: &EntityProfile,
        definition: &QueryDefinition,
        records: Vec<AggregatedRecord>,
    ) -> Vec<DocumentOutcome> {
        let graph = self.graph.graph();
        let mut resolver = RoleResolver::new(graph.clone());
        records
            .into_iter()
            .map(|record| self.build(profile, definition, &graph, &mut resolver, &record))
            .collect()
    }

    fn build(
        &self,
        profile: &EntityProfile,
        definition: &QueryDefinition,
        graph: &ContentGraph,
        resolver: &mut RoleResolver,
        record: &AggregatedRecord,
    ) -> DocumentOutcome {
        let mut document = IndexDocument::new(&profile.logical_name, &record.key);
        let mut errors = Vec::new();
        let primary_key = profile.primary_key_attribute();

        for (path, value) in &record.fields {
            let metadata = [
                profile.title_attribute.as_deref(),
                profile.language_code_attribute.as_deref(),
            ];
            if *path == primary_key || metadata.contains(&Some(path.as_str())) {
                continue;
            }
            if let Err(source) = definition.resolve_field(path) {
                errors.push(DocumentBuildError::Field {
                    field: path.clone(),
                    source,
                });
                continue;
            }
            self.encode(&mut document, path, value, &mut errors);
        }

        if let Some(title) = profile
            .title_attribute
            .as_deref()
            .and_then(|attribute| record.first(attribute))
        {
            document.set_title(&self.normalizer.normalize(&title.to_string()));
        }

        document.language_code = profile
            .language_code_attribute
            .as_deref()
            .and_then(|attribute| record.first(attribute))
            .map(|code| code.to_string())
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| self.default_language.clone());

        document.analyzer = profile
            .language_id_attribute
            .as_deref()
            .and_then(|attribute| record.first(attribute))
            .map(|id| Analyzer::for_language_id(&id.to_string()))
            .unwrap_or(Analyzer::Default);

        document.scope = profile
            .scope_attribute
            .as_deref()
            .and_then(|attribute| record.first(attribute))
            .and_then(FieldValue::as_id);

        document.roles = roles(profile, record, resolver, &mut errors);
        document.url_defined = url_defined(profile, record, graph);

        if errors.is_empty() {
            debug!(key = %document.entity_key(), "Built document");
            DocumentOutcome::Complete(document)
        } else {
            warn!(
                key = %document.entity_key(),
                errors = errors.len(),
                "Built partial document"
            );
            DocumentOutcome::Partial { document, errors }
        }
    }

    fn encode(
        &self,
        document: &mut IndexDocument,
        path: &str,
        value: &AggregatedValue,
        errors: &mut Vec<DocumentBuildError>,
    ) {
        let attribute_type = value.attribute_type;
        if attribute_type.is_identifier() {
            let ids: Vec<String> = value.values.iter().filter_map(FieldValue::as_id).collect();
            if ids.len() != value.values.len() {
                errors.push(DocumentBuildError::Encode {
                    field: path.to_string(),
                    reason: "not an identifier".into(),
                });
            }
            if !ids.is_empty() {
                document.set_field(path, ids.join(VALUE_DELIMITER));
            }
            let names: Vec<&str> = value
                .values
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Reference(reference) => reference.name.as_deref(),
                    _ => None,
                })
                .collect();
            if !names.is_empty() {
                document.set_field(format!("{path}.name"), names.join(VALUE_DELIMITER));
            }
        } else if attribute_type.is_date() {
            let mut dates = Vec::new();
            for v in &value.values {
                match as_datetime(v) {
                    Some(date) => dates.push(date),
                    None => errors.push(DocumentBuildError::Encode {
                        field: path.to_string(),
                        reason: format!("not a date: {v}"),
                    }),
                }
            }
            let Some(first) = dates.first() else {
                return;
            };
            let exact: Vec<String> = dates.iter().map(DateTime::to_rfc3339).collect();
            document.set_field(path, exact.join(VALUE_DELIMITER));
            document.set_field(format!("{path}.date"), first.format("%Y%m%d").to_string());
            document.set_field(format!("{path}.year"), first.year().to_string());
            document.set_field(format!("{path}.month"), first.month().to_string());
            document.set_field(format!("{path}.day"), first.day().to_string());
        } else if attribute_type.is_free_text() {
            let texts: Vec<String> = value
                .values
                .iter()
                .map(|v| self.normalizer.normalize(&v.to_string()))
                .filter(|text| !text.is_empty())
                .collect();
            for text in &texts {
                document.append_content(text);
            }
            let exact = texts.join(VALUE_DELIMITER);
            if !exact.is_empty() && exact.chars().count() <= MAX_EXACT_TEXT_CHARS {
                document.set_field(path, exact);
            }
        } else {
            let display = value.display();
            if !display.is_empty() {
                document.set_field(path, display);
            }
        }
    }
}

fn as_datetime(value: &FieldValue) -> Option<DateTime<Utc>> {
    match value {
        FieldValue::DateTime(date) => Some(*date),
        FieldValue::Text(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|date| date.with_timezone(&Utc)),
        _ => None,
    }
}

fn reference(record: &AggregatedRecord, attribute: &str) -> Option<String> {
    record.first(attribute).and_then(FieldValue::as_id)
}

fn roles(
    profile: &EntityProfile,
    record: &AggregatedRecord,
    resolver: &mut RoleResolver,
    errors: &mut Vec<DocumentBuildError>,
) -> Vec<String> {
    let key = match &profile.access {
        AccessSource::Public => return vec![PUBLIC_ROLE.to_string()],
        AccessSource::OwnNode => NodeKey::new(profile.logical_name.as_str(), &record.key),
        AccessSource::Container {
            attribute,
            logical_name,
        } => match reference(record, attribute) {
            Some(id) => NodeKey::new(logical_name.as_str(), &id),
            None => {
                errors.push(DocumentBuildError::MissingReference {
                    attribute: attribute.clone(),
                });
                return Vec::new();
            }
        },
    };

    match resolver.resolve(&key) {
        Ok(roles) => roles,
        Err(source) => {
            errors.push(DocumentBuildError::Roles {
                key: key.to_string(),
                source,
            });
            Vec::new()
        }
    }
}

fn url_defined(profile: &EntityProfile, record: &AggregatedRecord, graph: &ContentGraph) -> bool {
    let defined = match &profile.url {
        UrlTracking::Untracked => return true,
        UrlTracking::OwnPage => graph
            .url_path(&NodeKey::new(profile.logical_name.as_str(), &record.key))
            .is_some(),
        UrlTracking::ParentPage { attribute } => reference(record, attribute)
            .is_some_and(|id| graph.try_get(&NodeKey::new(logical_names::WEBPAGE, &id)).is_some()),
        UrlTracking::Container {
            attribute,
            logical_name,
        } => reference(record, attribute)
            .and_then(|id| graph.try_get(&NodeKey::new(logical_name.as_str(), &id)))
            .is_some_and(|container| graph.parent(container).is_some()),
    };
    if !defined {
        debug!(
            logical_name = %profile.logical_name,
            key = %record.key,
            "Url not defined"
        );
    }
    defined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use crate::profile::THREAD_ALIAS;
    use crate::source::ResultRow;
    use crate::text::MarkupStripper;
    use chrono::TimeZone;
    use portal_graph::{AccessRight, AccessRule, ContentNode, StaticGraphProvider};
    use portal_query::{JoinKind, LinkEntity};
    use portal_search::ContentLanguage;
    use portal_types::{AttributeType, EntityReference, TypedValue};

    fn graph() -> Arc<dyn ContentGraphProvider> {
        let home = NodeKey::new(logical_names::WEBPAGE, "home");
        let members = NodeKey::new(logical_names::WEBPAGE, "members");
        Arc::new(StaticGraphProvider::new(ContentGraph::from_nodes(vec![
            ContentNode::new(home.clone()).with_partial_url("/"),
            ContentNode::new(members.clone())
                .with_parent(home)
                .with_partial_url("members")
                .with_rule(AccessRule::new(
                    "members only",
                    AccessRight::RestrictRead,
                    &["members"],
                )),
            ContentNode::new(NodeKey::new(logical_names::FORUM, "f1")).with_parent(members),
            ContentNode::new(NodeKey::new(logical_names::FORUM, "loose")),
        ])))
    }

    fn factory() -> DocumentFactory {
        DocumentFactory::new(graph(), Arc::new(MarkupStripper::new().unwrap()), "en-US")
    }

    fn profile(name: &str) -> EntityProfile {
        EntityProfile::portal_profiles()
            .into_iter()
            .find(|p| p.logical_name == name)
            .unwrap()
    }

    fn build(profile: &EntityProfile, definition: &QueryDefinition, rows: &[ResultRow]) -> DocumentOutcome {
        let records = ResultAggregator::new(profile.primary_key_attribute()).push_page(rows, false);
        factory()
            .build_page(profile, definition, records)
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn test_webpage_document() {
        let profile = profile(logical_names::WEBPAGE);
        let definition = QueryDefinition::new(logical_names::WEBPAGE)
            .with_attributes(profile.required_attributes())
            .with_attribute("copy");
        let row = ResultRow::new()
            .with_id("webpageid", "{MEMBERS}")
            .with_text("name", "Members <b>area</b>")
            .with_text("copy", "<p>Welcome&nbsp;back</p>")
            .with_text("languagecode", "fr-FR")
            .with(
                "languageid",
                TypedValue::new(FieldValue::Integer(1036), AttributeType::Integer),
            )
            .with_id("websiteid", "SITE");

        let outcome = build(&profile, &definition, &[row]);
        assert!(!outcome.is_partial());
        let doc = outcome.document();
        assert_eq!(doc.primary_key, "members");
        assert_eq!(doc.title.as_deref(), Some("Members area"));
        assert_eq!(doc.content, "Members area Welcome back");
        assert_eq!(doc.language_code, "fr-FR");
        assert_eq!(doc.analyzer, Analyzer::Language(ContentLanguage::French));
        assert_eq!(doc.scope.as_deref(), Some("site"));
        assert_eq!(doc.roles, vec!["members"]);
        assert!(doc.url_defined);
        assert_eq!(doc.fields.get("copy").map(String::as_str), Some("Welcome back"));
    }

    #[test]
    fn test_default_language_and_analyzer() {
        let profile = EntityProfile::new(logical_names::CONTACT);
        let definition = QueryDefinition::new(logical_names::CONTACT);
        let row = ResultRow::new().with_id("contactid", "C1");

        let outcome = build(&profile, &definition, &[row]);
        let doc = outcome.document();
        assert_eq!(doc.language_code, "en-US");
        assert_eq!(doc.analyzer, Analyzer::Default);
        assert_eq!(doc.roles, vec![PUBLIC_ROLE]);
        assert!(doc.url_defined);
    }

    #[test]
    fn test_reference_and_date_encoding() {
        let profile = EntityProfile::new("incident");
        let definition = QueryDefinition::new("incident")
            .with_attributes(["customerid", "createdon", "priority"]);
        let created = Utc.with_ymd_and_hms(2024, 3, 7, 9, 30, 0).unwrap();
        let row = ResultRow::new()
            .with_id("incidentid", "I1")
            .with_reference(
                "customerid",
                EntityReference::new("contact", "{C-1}").with_name("Ada"),
            )
            .with(
                "createdon",
                TypedValue::new(FieldValue::DateTime(created), AttributeType::DateTime),
            )
            .with(
                "priority",
                TypedValue::new(
                    FieldValue::OptionSet {
                        value: 2,
                        label: Some("High".into()),
                    },
                    AttributeType::Picklist,
                ),
            );

        let outcome = build(&profile, &definition, &[row]);
        let fields = &outcome.document().fields;
        assert_eq!(fields["customerid"], "c-1");
        assert_eq!(fields["customerid.name"], "Ada");
        assert_eq!(fields["createdon"], "2024-03-07T09:30:00+00:00");
        assert_eq!(fields["createdon.date"], "20240307");
        assert_eq!(fields["createdon.year"], "2024");
        assert_eq!(fields["createdon.month"], "3");
        assert_eq!(fields["createdon.day"], "7");
        assert_eq!(fields["priority"], "2");
    }

    #[test]
    fn test_long_text_only_in_content() {
        let profile = EntityProfile::new("article");
        let definition = QueryDefinition::new("article").with_attribute("body");
        let body = "word ".repeat(100);
        let row = ResultRow::new()
            .with_id("articleid", "A1")
            .with("body", TypedValue::new(FieldValue::text(body), AttributeType::Memo));

        let outcome = build(&profile, &definition, &[row]);
        let doc = outcome.document();
        assert!(!doc.fields.contains_key("body"));
        assert!(doc.content.starts_with("word word"));
    }

    #[test]
    fn test_bad_date_is_partial() {
        let profile = EntityProfile::new("article");
        let definition = QueryDefinition::new("article").with_attribute("publishedon");
        let row = ResultRow::new().with_id("articleid", "A1").with(
            "publishedon",
            TypedValue::new(FieldValue::text("yesterday"), AttributeType::DateTime),
        );

        let outcome = build(&profile, &definition, &[row]);
        assert!(outcome.is_partial());
        assert!(matches!(
            outcome.errors()[0],
            DocumentBuildError::Encode { .. }
        ));
        assert_eq!(outcome.document().primary_key, "a1");
    }

    #[test]
    fn test_unknown_join_alias_is_partial() {
        let profile = EntityProfile::new("article");
        let definition = QueryDefinition::new("article");
        let row = ResultRow::new()
            .with_id("articleid", "A1")
            .with_text("ghost.fullname", "nobody");

        let outcome = build(&profile, &definition, &[row]);
        assert!(matches!(
            outcome.errors(),
            [DocumentBuildError::Field { field, .. }] if field == "ghost.fullname"
        ));
    }

    #[test]
    fn test_forum_post_inherits_forum_roles_through_thread() {
        let profile = profile(logical_names::FORUM_POST);
        let mut definition = QueryDefinition::new(logical_names::FORUM_POST)
            .with_attributes(profile.required_attributes());
        for link in &profile.links {
            definition = definition.with_link(link.clone());
        }
        let row = ResultRow::new()
            .with_id("forumpostid", "P1")
            .with_text("name", "Hello")
            .with_id(format!("{THREAD_ALIAS}.forumid"), "F1");

        let outcome = build(&profile, &definition, &[row]);
        assert!(!outcome.is_partial(), "{:?}", outcome.errors());
        let doc = outcome.document();
        assert_eq!(doc.roles, vec!["members"]);
        assert!(doc.url_defined);
        assert_eq!(doc.fields["thread.forumid"], "f1");
    }

    #[test]
    fn test_state_scoped_rule_reaches_post_through_container() {
        let home = NodeKey::new(logical_names::WEBPAGE, "home");
        let drafts = ContentGraph::from_nodes(vec![
            ContentNode::new(home.clone())
                .with_partial_url("/")
                .with_publishing_state("Published")
                .with_rule(
                    AccessRule::new("draft review", AccessRight::RestrictRead, &["reviewers"])
                        .with_publishing_states(&["Draft"]),
                ),
            ContentNode::new(NodeKey::new(logical_names::FORUM, "f-draft"))
                .with_parent(home.clone())
                .with_publishing_state("Draft"),
            ContentNode::new(NodeKey::new(logical_names::FORUM, "f-live"))
                .with_parent(home)
                .with_publishing_state("Published"),
        ]);
        let factory = DocumentFactory::new(
            Arc::new(StaticGraphProvider::new(drafts)),
            Arc::new(MarkupStripper::new().unwrap()),
            "en-US",
        );

        let profile = profile(logical_names::FORUM_POST);
        let mut definition = QueryDefinition::new(logical_names::FORUM_POST)
            .with_attributes(profile.required_attributes());
        for link in &profile.links {
            definition = definition.with_link(link.clone());
        }
        let rows = [
            ResultRow::new()
                .with_id("forumpostid", "P1")
                .with_id(format!("{THREAD_ALIAS}.forumid"), "F-DRAFT"),
            ResultRow::new()
                .with_id("forumpostid", "P2")
                .with_id(format!("{THREAD_ALIAS}.forumid"), "F-LIVE"),
        ];
        let records = ResultAggregator::new(profile.primary_key_attribute()).push_page(&rows, false);
        let outcomes = factory.build_page(&profile, &definition, records);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].document().roles, vec!["reviewers"]);
        assert_eq!(outcomes[1].document().roles, vec![PUBLIC_ROLE]);
    }

    #[test]
    fn test_container_without_parent_page_has_no_url() {
        let profile = profile(logical_names::FORUM_THREAD);
        let definition = QueryDefinition::new(logical_names::FORUM_THREAD)
            .with_attributes(profile.required_attributes());
        let row = ResultRow::new()
            .with_id("forumthreadid", "T1")
            .with_id("forumid", "LOOSE");

        let outcome = build(&profile, &definition, &[row]);
        assert!(!outcome.document().url_defined);
        assert_eq!(outcome.document().roles, vec![PUBLIC_ROLE]);
    }

    #[test]
    fn test_missing_container_reference() {
        let profile = profile(logical_names::BLOG_POST);
        let definition = QueryDefinition::new(logical_names::BLOG_POST)
            .with_attributes(profile.required_attributes());
        let row = ResultRow::new().with_id("blogpostid", "B1");

        let outcome = build(&profile, &definition, &[row]);
        assert!(outcome.is_partial());
        assert!(outcome.document().roles.is_empty());
        assert!(!outcome.document().url_defined);
    }

    #[test]
    fn test_aggregated_join_values_encoded_once() {
        let profile = EntityProfile::new(logical_names::FORUM_POST);
        let definition = QueryDefinition::new(logical_names::FORUM_POST).with_link(
            LinkEntity::new("contact", "contactid", "authorid")
                .with_alias("author")
                .with_link_type(JoinKind::Outer)
                .with_attribute("fullname"),
        );
        let rows = [
            ResultRow::new()
                .with_id("forumpostid", "P1")
                .with_text("author.fullname", "author1"),
            ResultRow::new()
                .with_id("forumpostid", "P1")
                .with_text("author.fullname", "author2"),
        ];

        let outcome = build(&profile, &definition, &rows);
        let doc = outcome.document();
        assert_eq!(doc.fields["author.fullname"], "author1,author2");
        assert_eq!(doc.content, "author1 author2");
    }
}
