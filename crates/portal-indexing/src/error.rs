//! Error types for the indexing pipeline.

use thiserror::Error;

use portal_graph::GraphError;
use portal_query::QueryError;
use portal_search::SearchError;

/// Failure of the external record store.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The store could not be reached or failed while paging
    #[error("Result source unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the query definition
    #[error("Query rejected by result source: {0}")]
    InvalidQuery(String),
}

/// Failure while turning one record into an index document.
///
/// These never abort a batch; they are collected on the document outcome.
#[derive(Error, Debug)]
pub enum DocumentBuildError {
    /// Field path could not be resolved through the join tree
    #[error("Cannot resolve field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: QueryError,
    },

    /// Value could not be encoded for its declared type
    #[error("Cannot encode field {field}: {reason}")]
    Encode { field: String, reason: String },

    /// Role resolution failed for a content graph node
    #[error("Cannot resolve roles for {key}: {source}")]
    Roles {
        key: String,
        #[source]
        source: GraphError,
    },

    /// Reference needed for roles or url tracking is missing
    #[error("Missing reference attribute {attribute}")]
    MissingReference { attribute: String },
}

/// Errors that can occur in the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Record store failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Query definition failure
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// Search index error
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Writer lock could not be acquired
    #[error("Index writer lock still held after {attempts} attempts")]
    LockContention { attempts: u32 },

    /// Write session lost its writer after a failed re-acquisition
    #[error("Write session has no index writer")]
    SessionClosed,

    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<tantivy::TantivyError> for IndexingError {
    fn from(err: tantivy::TantivyError) -> Self {
        IndexingError::Search(SearchError::Tantivy(err))
    }
}

impl From<regex::Error> for IndexingError {
    fn from(err: regex::Error) -> Self {
        IndexingError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexingError::LockContention { attempts: 3 };
        assert_eq!(
            err.to_string(),
            "Index writer lock still held after 3 attempts"
        );

        let err = IndexingError::Source(SourceError::Unavailable("timeout".into()));
        assert_eq!(
            err.to_string(),
            "Source error: Result source unavailable: timeout"
        );
    }

    #[test]
    fn test_from_query_error() {
        let err: IndexingError = QueryError::Lookup {
            alias: "author".into(),
        }
        .into();
        assert!(matches!(err, IndexingError::Query(_)));
    }

    #[test]
    fn test_document_error_display() {
        let err = DocumentBuildError::Encode {
            field: "modifiedon".into(),
            reason: "not a date".into(),
        };
        assert_eq!(err.to_string(), "Cannot encode field modifiedon: not a date");
    }
}
