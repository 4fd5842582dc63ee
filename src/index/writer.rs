//! Index writer and commit points.
//!
//! The writer buffers added documents and pending deletions in memory. A
//! commit turns the buffer into one new segment, writes new deletion
//! generations for segments that lost documents, drops segments with no live
//! documents left and finally publishes `segments_<gen>`, the commit point
//! listing every live segment. Files no longer referenced are removed after
//! the commit point is in place.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;

use crate::error::{Result, TesseraError};
use crate::index::DocId;
use crate::index::document::AnnotatedDocument;
use crate::index::reader::IndexReader;
use crate::index::segment::{Segment, SegmentCore, SegmentInfo, segment_name, write_deletions};
use crate::storage::{Storage, StorageError};
use crate::storage::structured::{StructReader, StructWriter};

const COMMIT_MAGIC: u32 = 0x5443_4D54; // "TCMT"
const COMMIT_VERSION: u32 = 1;
const COMMIT_PREFIX: &str = "segments_";

/// Contents of a `segments_<gen>` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPoint {
    pub generation: u64,
    /// Next segment counter; persisted so names stay deterministic on reopen.
    pub segment_counter: u64,
    pub segments: Vec<SegmentInfo>,
}

impl CommitPoint {
    pub fn file_name(generation: u64) -> String {
        format!("{COMMIT_PREFIX}{generation}")
    }

    /// Highest committed generation found in `storage`.
    pub fn latest_generation(storage: &dyn Storage) -> Result<Option<u64>> {
        Ok(storage
            .list_files()?
            .iter()
            .filter_map(|name| name.strip_prefix(COMMIT_PREFIX))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max())
    }

    /// Write the commit point under a temporary name and rename it into place.
    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let file_name = Self::file_name(self.generation);
        let temp_name = format!("{file_name}.tmp");

        let mut writer = StructWriter::new(storage.create_output(&temp_name)?);
        writer.write_u32(COMMIT_MAGIC)?;
        writer.write_u32(COMMIT_VERSION)?;
        writer.write_u64(self.generation)?;
        writer.write_u64(self.segment_counter)?;
        writer.write_varint(self.segments.len() as u64)?;
        for info in &self.segments {
            writer.write_string(&info.name)?;
            writer.write_varint(info.doc_count as u64)?;
            writer.write_varint(info.del_gen)?;
            writer.write_varint(info.del_count as u64)?;
            writer.write_u64(info.content_digest as u64)?;
            writer.write_u64((info.content_digest >> 64) as u64)?;
        }
        writer.close()?;

        storage.rename_file(&temp_name, &file_name)?;
        storage.sync()
    }

    pub fn read(storage: &dyn Storage, generation: u64) -> Result<Self> {
        let file_name = Self::file_name(generation);
        let mut reader = StructReader::new(storage.open_input(&file_name)?)?;

        if reader.read_u32()? != COMMIT_MAGIC {
            return Err(TesseraError::index(format!(
                "{file_name} is not a commit point"
            )));
        }
        let version = reader.read_u32()?;
        if version != COMMIT_VERSION {
            return Err(TesseraError::index(format!(
                "{file_name} has unsupported version {version}"
            )));
        }

        let stored_generation = reader.read_u64()?;
        if stored_generation != generation {
            return Err(TesseraError::index(format!(
                "{file_name} claims generation {stored_generation}"
            )));
        }
        let segment_counter = reader.read_u64()?;

        let count = reader.read_length()?;
        let mut segments = Vec::with_capacity(count);
        for _ in 0..count {
            let name = reader.read_string()?;
            let doc_count = reader.read_varint_u32()?;
            let del_gen = reader.read_varint()?;
            let del_count = reader.read_varint_u32()?;
            let low = reader.read_u64()?;
            let high = reader.read_u64()?;
            segments.push(SegmentInfo {
                name,
                doc_count,
                del_gen,
                del_count,
                content_digest: (u128::from(high) << 64) | u128::from(low),
            });
        }

        if !reader.verify_checksum()? {
            return Err(StorageError::ChecksumMismatch(file_name).into());
        }

        Ok(CommitPoint {
            generation,
            segment_counter,
            segments,
        })
    }
}

/// Buffers changes and commits them as new index generations.
#[derive(Debug)]
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    generation: Option<u64>,
    segment_counter: u64,
    segments: Vec<Arc<Segment>>,
    buffered: Vec<AnnotatedDocument>,
    pending_deletes: BTreeMap<String, BTreeSet<DocId>>,
}

impl IndexWriter {
    /// Open a writer on the latest commit point of `storage`, if any.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let mut writer = IndexWriter::empty(storage);

        if let Some(generation) = CommitPoint::latest_generation(writer.storage.as_ref())? {
            let commit = CommitPoint::read(writer.storage.as_ref(), generation)?;
            for info in commit.segments {
                let segment = Segment::load(writer.storage.as_ref(), info)?;
                writer.segments.push(Arc::new(segment));
            }
            writer.generation = Some(generation);
            writer.segment_counter = commit.segment_counter;
            debug!(
                "Opened commit generation {generation} with {} segments",
                writer.segments.len()
            );
        }

        Ok(writer)
    }

    /// A writer that ignores whatever `storage` already holds.
    pub fn empty(storage: Arc<dyn Storage>) -> Self {
        IndexWriter {
            storage,
            generation: None,
            segment_counter: 0,
            segments: Vec::new(),
            buffered: Vec::new(),
            pending_deletes: BTreeMap::new(),
        }
    }

    pub fn add_document(&mut self, doc: AnnotatedDocument) -> Result<()> {
        doc.validate()?;
        self.buffered.push(doc);
        Ok(())
    }

    /// Documents added since the last commit.
    pub fn open_documents(&self) -> usize {
        self.buffered.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.buffered.is_empty() || !self.pending_deletes.is_empty()
    }

    /// Delete every document whose `field` equals `value`.
    ///
    /// Buffered documents are dropped right away; deletions of committed
    /// documents take effect at the next commit. Returns whether anything
    /// matched.
    pub fn delete_by_field_value(&mut self, field: &str, value: &str) -> bool {
        let before = self.buffered.len();
        self.buffered
            .retain(|doc| !doc.field(field).is_some_and(|v| v.matches(value)));
        let mut found = self.buffered.len() != before;

        for segment in &self.segments {
            let matches = segment.find_by_field(field, value);
            if matches.is_empty() {
                continue;
            }
            let pending = self
                .pending_deletes
                .entry(segment.name().to_string())
                .or_default();
            for doc in matches {
                found |= pending.insert(doc);
            }
        }

        found
    }

    /// Discard buffered documents and pending deletions.
    pub fn rollback(&mut self) {
        self.buffered.clear();
        self.pending_deletes.clear();
    }

    /// Publish pending changes as a new generation.
    ///
    /// Returns the new snapshot, or `None` when there was nothing to commit.
    /// The very first commit always publishes, even when empty, so that an
    /// index has a defined fingerprint from then on.
    pub fn commit(&mut self) -> Result<Option<IndexReader>> {
        if self.generation.is_some() && !self.has_pending_changes() {
            return Ok(None);
        }

        let storage = Arc::clone(&self.storage);
        let mut segments = Vec::with_capacity(self.segments.len() + 1);

        for segment in &self.segments {
            let deleted: Vec<DocId> = self
                .pending_deletes
                .get(segment.name())
                .map(|docs| docs.iter().copied().collect())
                .unwrap_or_default();

            let next = match segment.with_deletions(&deleted) {
                Some(next) => {
                    if let Some(file_name) = next.info().deletions_file() {
                        write_deletions(storage.as_ref(), &file_name, next.deletions())?;
                    }
                    Arc::new(next)
                }
                None => Arc::clone(segment),
            };

            if next.num_docs() == 0 {
                debug!("Dropping fully deleted segment {}", next.name());
                continue;
            }
            segments.push(next);
        }

        let mut segment_counter = self.segment_counter;
        if !self.buffered.is_empty() {
            let name = segment_name(segment_counter);
            segment_counter += 1;

            let core = SegmentCore::build(self.buffered.clone())?;
            let segment = Segment::from_core(name, core);
            segment
                .core()
                .write(storage.as_ref(), &segment.info().segment_file())?;
            debug!(
                "Wrote segment {} with {} documents",
                segment.name(),
                segment.info().doc_count
            );
            segments.push(Arc::new(segment));
        }

        let generation = self.generation.map_or(1, |g| g + 1);
        let commit = CommitPoint {
            generation,
            segment_counter,
            segments: segments.iter().map(|s| s.info().clone()).collect(),
        };
        commit.write(storage.as_ref())?;
        Self::remove_unreferenced(storage.as_ref(), &commit)?;

        self.generation = Some(generation);
        self.segment_counter = segment_counter;
        self.segments = segments;
        self.buffered.clear();
        self.pending_deletes.clear();

        debug!(
            "Committed generation {generation} with {} segments",
            self.segments.len()
        );

        Ok(Some(self.snapshot()))
    }

    /// A reader over the last committed generation.
    pub fn snapshot(&self) -> IndexReader {
        IndexReader::new(self.generation, self.segments.clone())
    }

    fn remove_unreferenced(storage: &dyn Storage, commit: &CommitPoint) -> Result<()> {
        let mut referenced = BTreeSet::new();
        referenced.insert(CommitPoint::file_name(commit.generation));
        for info in &commit.segments {
            referenced.insert(info.segment_file());
            if let Some(file_name) = info.deletions_file() {
                referenced.insert(file_name);
            }
        }

        for file_name in storage.list_files()? {
            let ours = file_name.starts_with(COMMIT_PREFIX)
                || file_name.ends_with(".seg")
                || file_name.ends_with(".del");
            if ours && !referenced.contains(&file_name) {
                debug!("Removing unreferenced file {file_name}");
                storage.delete_file(&file_name)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PositionSource;
    use crate::storage::MemoryStorage;

    fn doc(uid: &str, text: &str) -> AnnotatedDocument {
        AnnotatedDocument::from_text(text).with_field("uid", uid)
    }

    #[test]
    fn test_commit_writes_segments_and_commit_point() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage)).unwrap();

        writer.add_document(doc("a", "eins zwei")).unwrap();
        writer.add_document(doc("b", "drei")).unwrap();
        assert_eq!(writer.open_documents(), 2);

        let reader = writer.commit().unwrap().unwrap();
        assert_eq!(reader.generation(), Some(1));
        assert_eq!(reader.leaves().len(), 1);
        assert_eq!(reader.leaves()[0].name(), "_0");
        assert_eq!(writer.open_documents(), 0);

        assert_eq!(
            storage.list_files().unwrap(),
            vec!["_0.seg".to_string(), "segments_1".to_string()]
        );

        // Nothing pending: no new generation.
        assert!(writer.commit().unwrap().is_none());
    }

    #[test]
    fn test_first_commit_of_empty_index() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(storage).unwrap();
        let reader = writer.commit().unwrap().unwrap();
        assert_eq!(reader.generation(), Some(1));
        assert!(reader.leaves().is_empty());
    }

    #[test]
    fn test_deletions_take_effect_at_commit() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage)).unwrap();
        writer.add_document(doc("a", "eins")).unwrap();
        writer.add_document(doc("b", "zwei")).unwrap();
        let before = writer.commit().unwrap().unwrap();

        assert!(writer.delete_by_field_value("uid", "a"));
        assert!(!writer.delete_by_field_value("uid", "zzz"));
        // Still visible in the old snapshot.
        assert!(!before.leaves()[0].is_deleted(0));

        let after = writer.commit().unwrap().unwrap();
        assert!(after.leaves()[0].is_deleted(0));
        assert_eq!(after.leaves()[0].del_gen(), 1);
        assert!(storage.file_exists("_0_1.del"));
        assert!(!storage.file_exists("segments_1"));
        assert_ne!(before.fingerprint(), after.fingerprint());
    }

    #[test]
    fn test_delete_buffered_and_drop_empty_segments() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(Arc::clone(&storage)).unwrap();

        writer.add_document(doc("a", "eins")).unwrap();
        assert!(writer.delete_by_field_value("uid", "a"));
        assert_eq!(writer.open_documents(), 0);

        writer.add_document(doc("b", "zwei")).unwrap();
        writer.commit().unwrap();
        writer.add_document(doc("c", "drei")).unwrap();
        writer.commit().unwrap();

        assert!(writer.delete_by_field_value("uid", "b"));
        let reader = writer.commit().unwrap().unwrap();
        let names: Vec<&str> = reader.leaves().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["_1"]);
        assert!(!storage.file_exists("_0.seg"));
    }

    #[test]
    fn test_reopen_restores_state() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let fingerprint = {
            let mut writer = IndexWriter::open(Arc::clone(&storage)).unwrap();
            writer.add_document(doc("a", "eins")).unwrap();
            writer.add_document(doc("b", "zwei")).unwrap();
            writer.commit().unwrap();
            writer.delete_by_field_value("uid", "b");
            writer.commit().unwrap().unwrap().fingerprint()
        };

        let mut writer = IndexWriter::open(Arc::clone(&storage)).unwrap();
        assert_eq!(writer.snapshot().fingerprint(), fingerprint);
        assert!(writer.snapshot().leaves()[0].is_deleted(1));

        writer.add_document(doc("c", "drei")).unwrap();
        let reader = writer.commit().unwrap().unwrap();
        assert_eq!(reader.leaves()[1].name(), "_1");
    }

    #[test]
    fn test_rollback() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut writer = IndexWriter::open(storage).unwrap();
        writer.add_document(doc("a", "eins")).unwrap();
        writer.rollback();
        assert!(!writer.has_pending_changes());
    }
}
