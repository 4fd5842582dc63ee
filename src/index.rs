//! Segmented positional index.
//!
//! [`Index`] ties together a storage, a single [`IndexWriter`] and the
//! currently published [`IndexReader`] snapshot:
//!
//! - `add_document` / `delete_by_field_value` buffer changes,
//! - `commit` publishes them as a new generation and swaps the snapshot,
//! - `reader` hands out the current snapshot, which stays valid (and
//!   unchanged) for as long as a search holds it.
//!
//! Span queries read segments through the [`PositionSource`] trait.
//!
//! # Example
//!
//! ```
//! use tessera::index::Index;
//! use tessera::index::document::AnnotatedDocument;
//!
//! # fn main() -> tessera::error::Result<()> {
//! let index = Index::create_in_memory();
//! index.add_document(AnnotatedDocument::from_text("Der alte Baum").with_field("uid", "d1"))?;
//! assert_eq!(index.fingerprint(), "null");
//!
//! index.commit()?;
//! assert_eq!(index.reader().num_docs(), 1);
//! assert_eq!(index.fingerprint().len(), 32);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::{Result, TesseraError};
use crate::search::Searcher;
use crate::storage::{FileStorage, FileStorageConfig, MemoryStorage, Storage};

pub mod document;
pub mod fingerprint;
pub mod posting;
pub mod reader;
pub mod segment;
pub mod writer;

pub use document::{AnnotatedDocument, FieldValue};
pub use reader::IndexReader;
pub use segment::{Segment, SegmentInfo};
pub use writer::IndexWriter;

use posting::PostingCursor;

/// Document number local to one segment.
pub type DocId = u32;

/// Positional data of one segment as seen by span iterators.
pub trait PositionSource: Send + Sync {
    /// One past the highest local document number.
    fn max_doc(&self) -> DocId;

    /// Whether `doc` is deleted in this generation.
    fn is_deleted(&self, doc: DocId) -> bool;

    /// Cursor over the postings of `term`; empty for unknown terms.
    fn postings(&self, term: &str) -> PostingCursor<'_>;

    /// Stored document data (text, token offsets, annotations, page breaks).
    fn document(&self, doc: DocId) -> Result<&AnnotatedDocument>;
}

/// Summary statistics of the published snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub generation: Option<u64>,
    pub fingerprint: String,
    pub segments: Vec<SegmentInfo>,
    pub num_docs: u64,
    pub max_doc: u64,
    pub open_documents: usize,
}

/// A single logical index instance.
#[derive(Debug)]
pub struct Index {
    storage: Arc<dyn Storage>,
    writer: Mutex<IndexWriter>,
    reader: RwLock<Arc<IndexReader>>,
}

impl Index {
    /// Open the index stored in `storage`, or start an empty one.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let writer = IndexWriter::open(Arc::clone(&storage))?;
        let reader = Arc::new(writer.snapshot());
        Ok(Index {
            storage,
            writer: Mutex::new(writer),
            reader: RwLock::new(reader),
        })
    }

    /// A fresh, non-persistent index.
    pub fn create_in_memory() -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let writer = IndexWriter::empty(Arc::clone(&storage));
        let reader = Arc::new(writer.snapshot());
        Index {
            storage,
            writer: Mutex::new(writer),
            reader: RwLock::new(reader),
        }
    }

    /// Open (or create) an index in a directory.
    pub fn open_in_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = FileStorageConfig::new(path.as_ref()).with_sync_writes(true);
        let storage = FileStorage::new(path.as_ref(), config)?;
        Self::open(Arc::new(storage))
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Buffer a document for the next commit.
    pub fn add_document(&self, doc: AnnotatedDocument) -> Result<()> {
        self.writer.lock().add_document(doc)
    }

    /// Buffer several documents; returns how many were added.
    pub fn add_documents<I>(&self, docs: I) -> Result<usize>
    where
        I: IntoIterator<Item = AnnotatedDocument>,
    {
        let mut writer = self.writer.lock();
        let mut added = 0;
        for doc in docs {
            writer.add_document(doc)?;
            added += 1;
        }
        Ok(added)
    }

    /// Documents added but not yet committed.
    pub fn open_documents(&self) -> usize {
        self.writer.lock().open_documents()
    }

    /// Delete all documents whose `field` equals `value`; visible after the
    /// next commit. Returns whether any document matched.
    pub fn delete_by_field_value(&self, field: &str, value: &str) -> bool {
        self.writer.lock().delete_by_field_value(field, value)
    }

    /// Commit pending changes and publish the new snapshot.
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(snapshot) = writer.commit()? {
            *self.reader.write() = Arc::new(snapshot);
        }
        Ok(())
    }

    /// Discard uncommitted changes.
    pub fn rollback(&self) {
        self.writer.lock().rollback();
    }

    /// The current snapshot.
    pub fn reader(&self) -> Arc<IndexReader> {
        Arc::clone(&*self.reader.read())
    }

    /// Re-read the latest commit point from storage.
    ///
    /// Picks up commits made by another `Index` over the same storage.
    /// Returns whether the published snapshot changed. Fails when this
    /// instance holds uncommitted changes that a reload would lose.
    pub fn reopen(&self) -> Result<bool> {
        let mut writer = self.writer.lock();
        let latest = writer::CommitPoint::latest_generation(self.storage.as_ref())?;
        if latest == self.reader.read().generation() {
            return Ok(false);
        }
        if writer.has_pending_changes() {
            return Err(TesseraError::index("Cannot reopen with uncommitted changes"));
        }

        let reloaded = IndexWriter::open(Arc::clone(&self.storage))?;
        *self.reader.write() = Arc::new(reloaded.snapshot());
        *writer = reloaded;
        Ok(true)
    }

    /// Fingerprint of the published snapshot; `"null"` before any commit.
    pub fn fingerprint(&self) -> String {
        self.reader().fingerprint()
    }

    /// Fingerprint of an arbitrary ordered leaf sequence.
    pub fn fingerprint_of(leaves: &[Arc<Segment>]) -> String {
        fingerprint::fingerprint_of(leaves.iter().map(|leaf| leaf.as_ref()))
    }

    /// A searcher over the current snapshot.
    pub fn searcher(&self) -> Searcher {
        Searcher::new(self.reader())
    }

    pub fn stats(&self) -> IndexStats {
        let reader = self.reader();
        IndexStats {
            generation: reader.generation(),
            fingerprint: reader.fingerprint(),
            segments: reader.leaves().iter().map(|s| s.info().clone()).collect(),
            num_docs: reader.num_docs(),
            max_doc: reader.max_doc(),
            open_documents: self.open_documents(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_swaps_snapshot() {
        let index = Index::create_in_memory();
        index
            .add_document(AnnotatedDocument::from_text("eins").with_field("uid", "a"))
            .unwrap();
        assert_eq!(index.open_documents(), 1);

        let before = index.reader();
        index.commit().unwrap();
        let after = index.reader();

        assert_eq!(before.num_docs(), 0);
        assert_eq!(after.num_docs(), 1);
        assert_eq!(index.fingerprint(), Index::fingerprint_of(after.leaves()));
    }

    #[test]
    fn test_reopen_sees_foreign_commits() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let first = Index::open(Arc::clone(&storage)).unwrap();
        let second = Index::open(Arc::clone(&storage)).unwrap();

        first
            .add_document(AnnotatedDocument::from_text("eins"))
            .unwrap();
        first.commit().unwrap();

        assert_eq!(second.fingerprint(), "null");
        assert!(second.reopen().unwrap());
        assert_eq!(second.fingerprint(), first.fingerprint());
        assert!(!second.reopen().unwrap());
    }

    #[test]
    fn test_reopen_refuses_to_drop_changes() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let first = Index::open(Arc::clone(&storage)).unwrap();
        let second = Index::open(Arc::clone(&storage)).unwrap();

        first.commit().unwrap();
        second
            .add_document(AnnotatedDocument::from_text("zwei"))
            .unwrap();
        assert!(second.reopen().is_err());
    }

    #[test]
    fn test_stats() {
        let index = Index::create_in_memory();
        index
            .add_documents(vec![
                AnnotatedDocument::from_text("eins"),
                AnnotatedDocument::from_text("zwei"),
            ])
            .unwrap();
        index.commit().unwrap();

        let stats = index.stats();
        assert_eq!(stats.generation, Some(1));
        assert_eq!(stats.num_docs, 2);
        assert_eq!(stats.segments.len(), 1);
        assert_eq!(stats.open_documents, 0);
    }
}
