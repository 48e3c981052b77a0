//! Per-type indexing profiles.
//!
//! A profile says which attributes an entity type needs fetched, where its
//! title and language come from, and how the content graph decides its read
//! roles and whether it has a url.

use portal_query::{JoinKind, LinkEntity};
use portal_types::{attributes, logical_names, primary_key_attribute};

/// Join alias used to reach a forum post's thread.
pub const THREAD_ALIAS: &str = "thread";

/// Where a document's read roles come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// Readable by everyone.
    Public,
    /// The record is itself a content graph node.
    OwnNode,
    /// The record inherits from the graph node referenced by `attribute`.
    Container {
        attribute: String,
        logical_name: String,
    },
}

/// How a document's "url defined" flag is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlTracking {
    /// Always defined.
    Untracked,
    /// A web page: its node resolves and its url path builds.
    OwnPage,
    /// The web page referenced by `attribute` resolves.
    ParentPage { attribute: String },
    /// The container referenced by `attribute` and that container's parent
    /// page both resolve.
    Container {
        attribute: String,
        logical_name: String,
    },
}

/// Indexing profile of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityProfile {
    pub logical_name: String,
    pub title_attribute: Option<String>,
    pub language_code_attribute: Option<String>,
    pub language_id_attribute: Option<String>,
    pub scope_attribute: Option<String>,
    pub access: AccessSource,
    pub url: UrlTracking,
    /// Joins the profile's field paths rely on.
    pub links: Vec<LinkEntity>,
}

impl EntityProfile {
    /// Public, untracked profile titled by `name`.
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into().to_ascii_lowercase(),
            title_attribute: Some(attributes::NAME.to_string()),
            language_code_attribute: None,
            language_id_attribute: None,
            scope_attribute: None,
            access: AccessSource::Public,
            url: UrlTracking::Untracked,
            links: Vec::new(),
        }
    }

    pub fn with_title(mut self, attribute: impl Into<String>) -> Self {
        self.title_attribute = Some(attribute.into());
        self
    }

    pub fn with_language(mut self, code_attribute: &str, id_attribute: &str) -> Self {
        self.language_code_attribute = Some(code_attribute.to_string());
        self.language_id_attribute = Some(id_attribute.to_string());
        self
    }

    pub fn with_scope(mut self, attribute: impl Into<String>) -> Self {
        self.scope_attribute = Some(attribute.into());
        self
    }

    pub fn with_access(mut self, access: AccessSource) -> Self {
        self.access = access;
        self
    }

    pub fn with_url(mut self, url: UrlTracking) -> Self {
        self.url = url;
        self
    }

    pub fn with_link(mut self, link: LinkEntity) -> Self {
        self.links.push(link);
        self
    }

    pub fn primary_key_attribute(&self) -> String {
        primary_key_attribute(&self.logical_name)
    }

    /// Root attributes the profile reads. Paths through a join are left to
    /// [`EntityProfile::links`].
    pub fn required_attributes(&self) -> Vec<String> {
        let mut names = vec![self.primary_key_attribute()];
        let optional = [
            self.title_attribute.as_deref(),
            self.language_code_attribute.as_deref(),
            self.language_id_attribute.as_deref(),
            self.scope_attribute.as_deref(),
            match &self.access {
                AccessSource::Container { attribute, .. } => Some(attribute.as_str()),
                _ => None,
            },
            match &self.url {
                UrlTracking::ParentPage { attribute } => Some(attribute.as_str()),
                UrlTracking::Container { attribute, .. } => Some(attribute.as_str()),
                _ => None,
            },
        ];
        for name in optional.into_iter().flatten() {
            if !name.contains('.') && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Profiles for the portal's well-known entity types.
    pub fn portal_profiles() -> Vec<EntityProfile> {
        use logical_names::*;

        let container = |attribute: &str, logical_name: &str| {
            (
                AccessSource::Container {
                    attribute: attribute.to_string(),
                    logical_name: logical_name.to_string(),
                },
                UrlTracking::Container {
                    attribute: attribute.to_string(),
                    logical_name: logical_name.to_string(),
                },
            )
        };
        let parent_page = || UrlTracking::ParentPage {
            attribute: attributes::PARENT_PAGE.to_string(),
        };
        let child = |name: &str, parent: &str| {
            let (access, url) = container(&primary_key_attribute(parent), parent);
            EntityProfile::new(name)
                .with_title(attributes::TITLE)
                .with_scope(attributes::WEBSITE)
                .with_access(access)
                .with_url(url)
        };
        let thread_forum = format!("{THREAD_ALIAS}.{}", primary_key_attribute(FORUM));
        let (post_access, post_url) = container(&thread_forum, FORUM);

        vec![
            EntityProfile::new(WEBPAGE)
                .with_language(attributes::LANGUAGE_CODE, attributes::LANGUAGE_ID)
                .with_scope(attributes::WEBSITE)
                .with_access(AccessSource::OwnNode)
                .with_url(UrlTracking::OwnPage),
            EntityProfile::new(FORUM)
                .with_scope(attributes::WEBSITE)
                .with_access(AccessSource::OwnNode)
                .with_url(parent_page()),
            child(FORUM_THREAD, FORUM).with_title(attributes::NAME),
            EntityProfile::new(FORUM_POST)
                .with_scope(attributes::WEBSITE)
                .with_access(post_access)
                .with_url(post_url)
                .with_link(
                    LinkEntity::new(
                        FORUM_THREAD,
                        primary_key_attribute(FORUM_THREAD),
                        primary_key_attribute(FORUM_THREAD),
                    )
                    .with_alias(THREAD_ALIAS)
                    .with_link_type(JoinKind::Outer)
                    .with_attribute(primary_key_attribute(FORUM)),
                ),
            EntityProfile::new(BLOG)
                .with_scope(attributes::WEBSITE)
                .with_access(AccessSource::OwnNode)
                .with_url(parent_page()),
            child(BLOG_POST, BLOG),
            EntityProfile::new(IDEA_FORUM)
                .with_title(attributes::TITLE)
                .with_scope(attributes::WEBSITE)
                .with_access(AccessSource::OwnNode)
                .with_url(parent_page()),
            child(IDEA, IDEA_FORUM),
            EntityProfile::new(ISSUE_FORUM)
                .with_title(attributes::TITLE)
                .with_scope(attributes::WEBSITE)
                .with_access(AccessSource::OwnNode)
                .with_url(parent_page()),
            child(ISSUE, ISSUE_FORUM),
            EntityProfile::new(ARTICLE)
                .with_title(attributes::TITLE)
                .with_language(attributes::LANGUAGE_CODE, attributes::LANGUAGE_ID),
        ]
    }
}
