//! Exclusive write session over the content index.
//!
//! A session owns the directory's single `IndexWriter` for the duration of
//! one mutation call. Dropping a session with uncommitted writes rolls them
//! back. Long batches can release and re-acquire the writer between commit
//! units so other writers get a turn.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tantivy::IndexWriter;
use tracing::{debug, info, warn};

use portal_search::{ContentIndex, IndexDocument};

use crate::error::IndexingError;
use crate::retry::LockRetryPolicy;

/// Counters for one mutation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationStats {
    /// Documents written.
    pub added: usize,
    /// Delete terms issued (by key or by type).
    pub deleted_terms: usize,
    /// Documents written with construction errors.
    pub partial: usize,
    /// Commits made.
    pub batches: usize,
}

impl MutationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_added(&mut self, partial: bool) {
        self.added += 1;
        if partial {
            self.partial += 1;
        }
    }

    pub fn record_delete(&mut self) {
        self.deleted_terms += 1;
    }

    pub fn record_commit(&mut self) {
        self.batches += 1;
    }

    pub fn merge(&mut self, other: &MutationStats) {
        self.added += other.added;
        self.deleted_terms += other.deleted_terms;
        self.partial += other.partial;
        self.batches += other.batches;
    }

    pub fn has_updates(&self) -> bool {
        self.added > 0 || self.deleted_terms > 0
    }
}

/// RAII guard holding the index write lock.
pub struct WriteSession<'a> {
    index: &'a ContentIndex,
    retry: &'a LockRetryPolicy,
    writer: Option<IndexWriter>,
    release_interval: Option<Duration>,
    acquired_at: Instant,
    dirty: bool,
    stats: MutationStats,
}

impl<'a> WriteSession<'a> {
    /// Acquire the writer, retrying while another session holds it.
    pub fn open(
        index: &'a ContentIndex,
        retry: &'a LockRetryPolicy,
        release_interval: Option<Duration>,
    ) -> Result<Self, IndexingError> {
        let writer = retry.acquire(|| index.writer())?;
        debug!(path = ?index.path(), "Write session opened");
        Ok(Self {
            index,
            retry,
            writer: Some(writer),
            release_interval,
            acquired_at: Instant::now(),
            dirty: false,
            stats: MutationStats::new(),
        })
    }

    fn writer(&mut self) -> Result<&mut IndexWriter, IndexingError> {
        self.writer.as_mut().ok_or(IndexingError::SessionClosed)
    }

    /// Whether this session commits and releases the writer mid-operation.
    pub fn releases_lock(&self) -> bool {
        self.release_interval.is_some()
    }

    pub fn stats(&self) -> &MutationStats {
        &self.stats
    }

    pub fn add(&mut self, document: &IndexDocument, partial: bool) -> Result<(), IndexingError> {
        let doc = document.to_tantivy(self.index.schema());
        self.writer()?.add_document(doc)?;
        self.dirty = true;
        self.stats.record_added(partial);
        Ok(())
    }

    /// Delete the document of one entity record.
    pub fn delete_entity(&mut self, logical_name: &str, primary_key: &str) -> Result<(), IndexingError> {
        let term = self.index.schema().entity_key_term(logical_name, primary_key);
        self.writer()?.delete_term(term);
        self.dirty = true;
        self.stats.record_delete();
        Ok(())
    }

    /// Delete every document of one entity type.
    pub fn delete_type(&mut self, logical_name: &str) -> Result<(), IndexingError> {
        let term = self.index.schema().logical_name_term(logical_name);
        self.writer()?.delete_term(term);
        self.dirty = true;
        self.stats.record_delete();
        Ok(())
    }

    pub fn delete_all(&mut self) -> Result<(), IndexingError> {
        self.writer()?.delete_all_documents()?;
        self.dirty = true;
        self.stats.record_delete();
        Ok(())
    }

    fn commit_pending(&mut self) -> Result<(), IndexingError> {
        self.writer()?.commit()?;
        self.dirty = false;
        self.stats.record_commit();
        Ok(())
    }

    /// Commit and hand the lock to other writers once the release interval
    /// has elapsed, then take it back before continuing.
    ///
    /// Returns whether the lock was released.
    pub fn relock_if_due(&mut self) -> Result<bool, IndexingError> {
        let Some(interval) = self.release_interval else {
            return Ok(false);
        };
        if self.acquired_at.elapsed() < interval {
            return Ok(false);
        }

        self.commit_pending()?;
        // Dropping the writer releases the directory lock.
        self.writer = None;
        debug!(batches = self.stats.batches, "Released index writer");

        let index = self.index;
        self.writer = Some(self.retry.acquire(|| index.writer())?);
        self.acquired_at = Instant::now();
        Ok(true)
    }

    /// Commit outstanding writes and release the lock.
    pub fn commit(mut self) -> Result<MutationStats, IndexingError> {
        self.commit_pending()?;
        self.writer = None;
        Ok(self.stats)
    }

    /// Commit, merge all searchable segments into one and clean up
    /// unreferenced files.
    pub fn commit_and_compact(mut self) -> Result<MutationStats, IndexingError> {
        self.commit_pending()?;
        let segments = self.index.index().searchable_segment_ids()?;
        let mut writer = self.writer.take().ok_or(IndexingError::SessionClosed)?;
        if segments.len() > 1 {
            writer.merge(&segments).wait()?;
        }
        writer.garbage_collect_files().wait()?;
        writer.wait_merging_threads()?;
        info!(segments = segments.len(), "Compacted content index");
        Ok(self.stats)
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            match writer.rollback() {
                Ok(_) => warn!(
                    added = self.stats.added,
                    "Rolled back uncommitted index writes"
                ),
                Err(e) => warn!(error = %e, "Rollback of index writes failed"),
            }
        }
    }
}
