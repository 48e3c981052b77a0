//! On-disk content index.
//!
//! A [`ContentIndex`] is a handle on one tantivy directory. Every clone
//! shares the directory and therefore its single writer lock: at most one
//! [`IndexWriter`] exists across all handles (and processes), and asking for
//! a second one fails with a lock error until the first is dropped.

use std::fs;
use std::path::{Path, PathBuf};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info};

use portal_types::Settings;

use crate::analyzer::register_analyzers;
use crate::error::SearchError;
use crate::schema::{build_portal_schema, IndexSchema};

/// Writer heap per index, in megabytes.
const DEFAULT_WRITER_HEAP_MB: usize = 50;

const META_FILE: &str = "meta.json";

#[derive(Debug, Clone)]
pub struct ContentIndexConfig {
    /// Directory holding the tantivy segments
    pub index_path: PathBuf,
    /// Heap given to each index writer
    pub writer_memory_mb: usize,
}

impl ContentIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_HEAP_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    fn writer_heap_bytes(&self) -> usize {
        self.writer_memory_mb.max(15) * 1024 * 1024
    }
}

impl Default for ContentIndexConfig {
    fn default() -> Self {
        Self::new("./content-index")
    }
}

impl From<&Settings> for ContentIndexConfig {
    fn from(settings: &Settings) -> Self {
        Self::new(settings.expanded_index_path()).with_memory_mb(settings.writer_memory_mb)
    }
}

/// Handle on the content index directory.
#[derive(Clone)]
pub struct ContentIndex {
    index: Index,
    schema: IndexSchema,
    config: ContentIndexConfig,
}

impl ContentIndex {
    /// Open the index at the configured path, creating it on first use.
    ///
    /// An existing index whose schema lacks the portal fields is rejected
    /// with [`SearchError::SchemaMismatch`].
    pub fn open_or_create(config: ContentIndexConfig) -> Result<Self, SearchError> {
        let index = open_or_create_index(&config.index_path)?;
        let schema = IndexSchema::from_schema(index.schema())?;
        info!(
            path = %config.index_path.display(),
            segments = index.searchable_segment_ids()?.len(),
            "Content index ready"
        );
        Ok(Self {
            index,
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    /// Take the directory's writer lock.
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let writer = self.index.writer(self.config.writer_heap_bytes())?;
        debug!(heap_mb = self.config.writer_memory_mb, "Index writer acquired");
        Ok(writer)
    }

    /// Reader that only sees new commits after an explicit reload.
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?)
    }

    /// Searchable segments in the last commit.
    pub fn segment_count(&self) -> Result<usize, SearchError> {
        Ok(self.index.searchable_segment_ids()?.len())
    }

    pub fn exists(&self) -> bool {
        self.config.index_path.join(META_FILE).exists()
    }
}

/// Open the tantivy index in `path` or create an empty portal index there.
/// Language analyzers are registered either way.
pub fn open_or_create_index(path: &Path) -> Result<Index, SearchError> {
    let index = if path.join(META_FILE).exists() {
        Index::open_in_dir(path)?
    } else {
        fs::create_dir_all(path)?;
        info!(path = %path.display(), "Creating content index");
        Index::create_in_dir(path, build_portal_schema().schema().clone())?
    };
    register_analyzers(&index);
    Ok(index)
}
