//! Immutable index segments ("leaves").
//!
//! A segment is written once, at commit, as `<name>.seg`. Deletions never
//! touch that file: each commit that deletes documents from a segment writes a
//! new `<name>_<del_gen>.del` bitset and bumps the segment's deletion
//! generation. Documents are numbered locally from zero inside every segment.
//!
//! Every segment carries a content digest: the xxh3-128 of its encoded file
//! body. It is recorded in the commit point and checked again on load.

use std::io::Write;
use std::sync::Arc;

use bit_vec::BitVec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::index::document::{AnnotatedDocument, ElementAnnotation, FieldValue, PageBreak, Token};
use crate::index::posting::{PostingCursor, PostingIndex};
use crate::index::{DocId, PositionSource};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageError, StorageInput, StorageOutput};

const SEGMENT_MAGIC: u32 = 0x5453_4547; // "TSEG"
const DELETIONS_MAGIC: u32 = 0x5444_454C; // "TDEL"
const FORMAT_VERSION: u32 = 1;

/// Identity and bookkeeping of a committed segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Deterministic name: `_` followed by the base-36 segment counter.
    pub name: String,

    /// Documents stored in the segment, deleted ones included.
    pub doc_count: u32,

    /// Bumped by every commit that adds deletions; 0 means none.
    pub del_gen: u64,

    /// Number of deleted documents.
    pub del_count: u32,

    /// xxh3-128 of the encoded segment body.
    pub content_digest: u128,
}

impl SegmentInfo {
    pub fn new<S: Into<String>>(name: S, doc_count: u32, content_digest: u128) -> Self {
        SegmentInfo {
            name: name.into(),
            doc_count,
            del_gen: 0,
            del_count: 0,
            content_digest,
        }
    }

    pub fn segment_file(&self) -> String {
        format!("{}.seg", self.name)
    }

    pub fn deletions_file(&self) -> Option<String> {
        (self.del_gen > 0).then(|| format!("{}_{}.del", self.name, self.del_gen))
    }

    pub fn live_docs(&self) -> u32 {
        self.doc_count - self.del_count
    }
}

/// Render a segment counter as a segment name.
pub fn segment_name(counter: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut digits = Vec::new();
    let mut value = counter;
    loop {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    format!("_{}", String::from_utf8_lossy(&digits))
}

/// Output that only counts bytes; lets the digest of a core be taken
/// without storing it.
#[derive(Debug, Default)]
struct DigestOnly {
    written: u64,
}

impl Write for DigestOnly {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for DigestOnly {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.written)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Postings and stored documents; shared by every generation of a segment.
#[derive(Debug)]
pub struct SegmentCore {
    postings: PostingIndex,
    documents: Vec<AnnotatedDocument>,
    digest: u128,
}

impl SegmentCore {
    /// Invert a batch of documents. Document `i` of the batch gets local id `i`.
    pub fn build(documents: Vec<AnnotatedDocument>) -> Result<Self> {
        let mut postings = PostingIndex::new();
        for (doc_id, doc) in documents.iter().enumerate() {
            postings.add_document(doc_id as DocId, doc);
        }
        postings.optimize();

        let mut core = SegmentCore {
            postings,
            documents,
            digest: 0,
        };
        let mut writer = StructWriter::new(DigestOnly::default());
        core.encode(&mut writer)?;
        core.digest = writer.digest();
        Ok(core)
    }

    /// Digest of the encoded body; equal for equal document batches.
    pub fn digest(&self) -> u128 {
        self.digest
    }

    pub fn documents(&self) -> &[AnnotatedDocument] {
        &self.documents
    }

    pub fn postings(&self) -> &PostingIndex {
        &self.postings
    }

    pub fn write(&self, storage: &dyn Storage, file_name: &str) -> Result<()> {
        let mut writer = StructWriter::new(storage.create_output(file_name)?);
        self.encode(&mut writer)?;
        writer.close()
    }

    fn encode<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_u32(SEGMENT_MAGIC)?;
        writer.write_u32(FORMAT_VERSION)?;

        writer.write_varint(self.documents.len() as u64)?;
        for doc in &self.documents {
            write_document(writer, doc)?;
        }
        self.postings.encode(writer)
    }

    pub fn read(storage: &dyn Storage, file_name: &str) -> Result<Self> {
        let mut reader = StructReader::new(storage.open_input(file_name)?)?;
        check_header(&mut reader, SEGMENT_MAGIC, file_name)?;

        let doc_count = reader.read_length()?;
        let mut documents = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            documents.push(read_document(&mut reader)?);
        }
        let postings = PostingIndex::decode(&mut reader)?;
        let digest = reader.digest();

        if !reader.verify_checksum()? {
            return Err(StorageError::ChecksumMismatch(file_name.to_string()).into());
        }
        reader.close()?;

        Ok(SegmentCore {
            postings,
            documents,
            digest,
        })
    }
}

fn check_header<R: StorageInput>(
    reader: &mut StructReader<R>,
    magic: u32,
    file_name: &str,
) -> Result<()> {
    let found = reader.read_u32()?;
    if found != magic {
        return Err(TesseraError::storage(format!(
            "{file_name} is not a Tessera file (magic {found:#010x})"
        )));
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(TesseraError::storage(format!(
            "{file_name} has unsupported format version {version}"
        )));
    }
    Ok(())
}

fn write_document<W: StorageOutput>(
    writer: &mut StructWriter<W>,
    doc: &AnnotatedDocument,
) -> Result<()> {
    writer.write_varint(doc.fields.len() as u64)?;
    for (name, value) in &doc.fields {
        writer.write_string(name)?;
        match value {
            FieldValue::Integer(number) => {
                writer.write_u8(0)?;
                writer.write_varint_i64(*number)?;
            }
            FieldValue::Text(text) => {
                writer.write_u8(1)?;
                writer.write_string(text)?;
            }
        }
    }

    writer.write_string(&doc.text)?;

    writer.write_varint(doc.tokens.len() as u64)?;
    for token in &doc.tokens {
        writer.write_varint(token.start_offset as u64)?;
        writer.write_varint((token.end_offset - token.start_offset) as u64)?;
        writer.write_varint(token.terms.len() as u64)?;
        for term in &token.terms {
            writer.write_string(term)?;
        }
    }

    writer.write_varint(doc.elements.len() as u64)?;
    for element in &doc.elements {
        writer.write_string(&element.term)?;
        writer.write_varint(element.start as u64)?;
        writer.write_varint(element.end as u64)?;
        writer.write_varint_i64(element.payload.map_or(-1, i64::from))?;
    }

    writer.write_varint(doc.page_breaks.len() as u64)?;
    for page_break in &doc.page_breaks {
        writer.write_varint(page_break.position as u64)?;
        writer.write_varint(page_break.page as u64)?;
    }

    Ok(())
}

fn read_document<R: StorageInput>(reader: &mut StructReader<R>) -> Result<AnnotatedDocument> {
    let mut doc = AnnotatedDocument::default();

    for _ in 0..reader.read_length()? {
        let name = reader.read_string()?;
        let value = match reader.read_u8()? {
            0 => FieldValue::Integer(reader.read_varint_i64()?),
            1 => FieldValue::Text(reader.read_string()?),
            tag => {
                return Err(TesseraError::storage(format!(
                    "Invalid field tag {tag} for field {name}"
                )));
            }
        };
        doc.fields.insert(name, value);
    }

    doc.text = reader.read_string()?;

    let token_count = reader.read_length()?;
    doc.tokens.reserve(token_count);
    for _ in 0..token_count {
        let start_offset = reader.read_varint_u32()?;
        let end_offset = start_offset + reader.read_varint_u32()?;
        let term_count = reader.read_length()?;
        let mut terms = Vec::with_capacity(term_count);
        for _ in 0..term_count {
            terms.push(reader.read_string()?);
        }
        doc.tokens.push(Token {
            start_offset,
            end_offset,
            terms,
        });
    }

    for _ in 0..reader.read_length()? {
        let term = reader.read_string()?;
        let start = reader.read_varint_u32()?;
        let end = reader.read_varint_u32()?;
        let payload = u32::try_from(reader.read_varint_i64()?).ok();
        doc.elements.push(ElementAnnotation {
            term,
            start,
            end,
            payload,
        });
    }

    for _ in 0..reader.read_length()? {
        let position = reader.read_varint_u32()?;
        let page = reader.read_varint_u32()?;
        doc.page_breaks.push(PageBreak { position, page });
    }

    Ok(doc)
}

/// Write the deletion bitset of a segment generation.
pub fn write_deletions(storage: &dyn Storage, file_name: &str, deletions: &BitVec) -> Result<()> {
    let mut writer = StructWriter::new(storage.create_output(file_name)?);
    writer.write_u32(DELETIONS_MAGIC)?;
    writer.write_u32(FORMAT_VERSION)?;
    writer.write_varint(deletions.len() as u64)?;
    writer.write_bytes(&deletions.to_bytes())?;
    writer.close()
}

/// Read a deletion bitset written by [`write_deletions`].
pub fn read_deletions(storage: &dyn Storage, file_name: &str) -> Result<BitVec> {
    let mut reader = StructReader::new(storage.open_input(file_name)?)?;
    check_header(&mut reader, DELETIONS_MAGIC, file_name)?;
    let len = reader.read_length()?;
    let mut deletions = BitVec::from_bytes(&reader.read_bytes()?);
    if deletions.len() < len {
        return Err(TesseraError::storage(format!(
            "{file_name} holds {} bits, expected {len}",
            deletions.len()
        )));
    }
    deletions.truncate(len);

    if !reader.verify_checksum()? {
        return Err(StorageError::ChecksumMismatch(file_name.to_string()).into());
    }
    Ok(deletions)
}

/// One generation of a committed segment.
///
/// Cloning is cheap: the core and the deletion bitset are shared.
#[derive(Debug, Clone)]
pub struct Segment {
    info: SegmentInfo,
    core: Arc<SegmentCore>,
    deletions: Arc<BitVec>,
}

impl Segment {
    pub fn new(info: SegmentInfo, core: Arc<SegmentCore>, deletions: Arc<BitVec>) -> Self {
        Segment {
            info,
            core,
            deletions,
        }
    }

    /// A fresh segment without deletions.
    pub fn from_core(name: String, core: SegmentCore) -> Self {
        let doc_count = core.documents.len() as u32;
        Segment {
            info: SegmentInfo::new(name, doc_count, core.digest),
            core: Arc::new(core),
            deletions: Arc::new(BitVec::from_elem(doc_count as usize, false)),
        }
    }

    /// Load a committed segment generation from storage.
    pub fn load(storage: &dyn Storage, info: SegmentInfo) -> Result<Self> {
        let core = SegmentCore::read(storage, &info.segment_file())?;
        if core.documents.len() as u32 != info.doc_count {
            return Err(TesseraError::index(format!(
                "Segment {} holds {} documents, commit says {}",
                info.name,
                core.documents.len(),
                info.doc_count
            )));
        }
        if core.digest != info.content_digest {
            return Err(TesseraError::index(format!(
                "Segment {} does not match the digest recorded at commit",
                info.name
            )));
        }
        let deletions = match info.deletions_file() {
            Some(file_name) => read_deletions(storage, &file_name)?,
            None => BitVec::from_elem(info.doc_count as usize, false),
        };
        Ok(Segment::new(info, Arc::new(core), Arc::new(deletions)))
    }

    /// The next generation of this segment with `deleted` documents added to
    /// its deletions. Returns `None` when nothing new is deleted.
    pub fn with_deletions(&self, deleted: &[DocId]) -> Option<Segment> {
        let mut deletions = (*self.deletions).clone();
        let mut changed = false;
        for &doc in deleted {
            let doc = doc as usize;
            if doc < deletions.len() && !deletions[doc] {
                deletions.set(doc, true);
                changed = true;
            }
        }
        if !changed {
            return None;
        }

        let mut info = self.info.clone();
        info.del_gen += 1;
        info.del_count = deletions.iter().filter(|deleted| *deleted).count() as u32;
        Some(Segment::new(info, Arc::clone(&self.core), Arc::new(deletions)))
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn del_gen(&self) -> u64 {
        self.info.del_gen
    }

    pub fn core(&self) -> &Arc<SegmentCore> {
        &self.core
    }

    pub fn deletions(&self) -> &BitVec {
        &self.deletions
    }

    pub fn num_docs(&self) -> u32 {
        self.info.live_docs()
    }

    /// Live documents whose `field` equals `value`.
    pub fn find_by_field(&self, field: &str, value: &str) -> Vec<DocId> {
        self.core
            .documents
            .iter()
            .enumerate()
            .filter(|(doc, _)| !self.is_deleted(*doc as DocId))
            .filter(|(_, document)| document.field(field).is_some_and(|v| v.matches(value)))
            .map(|(doc, _)| doc as DocId)
            .collect()
    }
}

impl PositionSource for Segment {
    fn max_doc(&self) -> DocId {
        self.info.doc_count
    }

    fn is_deleted(&self, doc: DocId) -> bool {
        self.deletions.get(doc as usize).unwrap_or(true)
    }

    fn postings(&self, term: &str) -> PostingCursor<'_> {
        self.core
            .postings
            .get(term)
            .map(|list| list.cursor())
            .unwrap_or_else(PostingCursor::empty)
    }

    fn document(&self, doc: DocId) -> Result<&AnnotatedDocument> {
        self.core.documents.get(doc as usize).ok_or_else(|| {
            TesseraError::not_found(format!("Document {doc} in segment {}", self.info.name))
        })
    }
}
