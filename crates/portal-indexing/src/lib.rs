//! Query-driven indexing pipeline for portal content.
//!
//! Records are fetched page by page from an external store, merged per
//! primary key, turned into index documents annotated with read roles and
//! url status, and written to the content index under an exclusive write
//! session.
//!
//! ## Key Components
//!
//! - [`ResultSource`]: Paged access to the external record store
//! - [`ResultAggregator`]: Merges fanned-out join rows across page boundaries
//! - [`EntityProfile`]: Per-type title, language, access and url rules
//! - [`DocumentFactory`]: Encodes records into [`portal_search::IndexDocument`]s
//! - [`Indexer`]: Lazy document stream for one entity type
//! - [`WriteSession`]: RAII guard over the index writer lock
//! - [`IndexMutator`]: Build, delete and update operations
//! - [`ContentTreeUpdater`]: Plans cascading updates below a root record
//!
//! ## Example
//!
//! ```ignore
//! use portal_indexing::{default_indexers, DocumentFactory, IndexMutator, MarkupStripper, MutatorConfig};
//!
//! let factory = Arc::new(DocumentFactory::new(graph.clone(), Arc::new(MarkupStripper::new()?), "en"));
//! let mutator = IndexMutator::new(index, graph, MutatorConfig::from(&settings))
//!     .with_indexers(default_indexers(source, factory, settings.page_size)?);
//!
//! mutator.build()?;
//! mutator.update_content_tree("webpage", &page_id, Some("en-US"))?;
//! ```

pub mod aggregate;
pub mod error;
pub mod factory;
pub mod indexer;
pub mod mutator;
pub mod profile;
pub mod retry;
pub mod session;
pub mod source;
pub mod text;
pub mod tree;

pub use aggregate::{AggregatedRecord, AggregatedValue, ResultAggregator, VALUE_DELIMITER};
pub use error::{DocumentBuildError, IndexingError, SourceError};
pub use factory::{DocumentFactory, DocumentOutcome};
pub use indexer::{default_indexers, DocumentIter, FetchIndexer, Indexer, ScopeFilter};
pub use mutator::{IndexMutator, MutatorConfig};
pub use profile::{AccessSource, EntityProfile, UrlTracking};
pub use retry::LockRetryPolicy;
pub use session::{MutationStats, WriteSession};
pub use source::{MockResultSource, ResultPage, ResultRow, ResultSource};
pub use text::{MarkupStripper, TextNormalizer};
pub use tree::{ContentTreeUpdater, TreeStep};
