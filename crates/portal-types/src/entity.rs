//! Well-known entity types of the portal content store.
//!
//! Relation attributes follow the store's naming convention: a lookup to a
//! parent entity carries the parent's primary key name (`forumthread.forumid`
//! references `forum.forumid`).

/// Role sentinel meaning "readable by everyone".
pub const PUBLIC_ROLE: &str = "*";

/// Logical names of the entity types the pipeline knows about.
pub mod logical_names {
    pub const WEBPAGE: &str = "webpage";
    pub const FORUM: &str = "forum";
    pub const FORUM_THREAD: &str = "forumthread";
    pub const FORUM_POST: &str = "forumpost";
    pub const BLOG: &str = "blog";
    pub const BLOG_POST: &str = "blogpost";
    pub const IDEA_FORUM: &str = "ideaforum";
    pub const IDEA: &str = "idea";
    pub const ISSUE_FORUM: &str = "issueforum";
    pub const ISSUE: &str = "issue";
    pub const ARTICLE: &str = "article";
    pub const ATTACHMENT: &str = "annotation";
    pub const CONTACT: &str = "contact";
}

/// Attribute names shared by several entity types.
pub mod attributes {
    /// Lookup from content entities to the web page that hosts them.
    pub const PARENT_PAGE: &str = "parentpageid";
    /// Url segment of a web page.
    pub const PARTIAL_URL: &str = "partialurl";
    pub const NAME: &str = "name";
    pub const TITLE: &str = "title";
    pub const LANGUAGE_CODE: &str = "languagecode";
    pub const LANGUAGE_ID: &str = "languageid";
    pub const PUBLISHING_STATE: &str = "publishingstateid";
    pub const STATE_CODE: &str = "statecode";
    pub const MODIFIED_ON: &str = "modifiedon";
    /// Website a record belongs to; indexed as the document scope.
    pub const WEBSITE: &str = "websiteid";
}

/// Primary key attribute for a logical name (`forum` -> `forumid`).
pub fn primary_key_attribute(logical_name: &str) -> String {
    format!("{logical_name}id")
}
