//! Positional posting lists.
//!
//! For every term a segment keeps the documents it occurs in and, per
//! document, the `(start, end, payload)` entries of each occurrence. Token
//! annotations occupy `[p, p + 1)`, element annotations their whole token
//! range and page breaks the empty range `[p, p)`.

use ahash::AHashMap;

use crate::error::{Result, TesseraError};
use crate::index::DocId;
use crate::index::document::{AnnotatedDocument, PAGE_BREAK_TERM};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// One occurrence of a term inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionEntry {
    pub start: u32,
    pub end: u32,
    pub payload: Option<u32>,
}

impl PositionEntry {
    pub fn new(start: u32, end: u32) -> Self {
        PositionEntry {
            start,
            end,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: u32) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// All occurrences of one term in one document, sorted by (start, end).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub positions: Vec<PositionEntry>,
}

/// All postings of a term, sorted by document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingList {
    pub term: String,
    pub postings: Vec<Posting>,
}

impl PostingList {
    pub fn new(term: String) -> Self {
        PostingList {
            term,
            postings: Vec::new(),
        }
    }

    /// Record an occurrence, keeping documents sorted.
    pub fn add_entry(&mut self, doc_id: DocId, entry: PositionEntry) {
        match self.postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
            Ok(pos) => self.postings[pos].positions.push(entry),
            Err(pos) => self.postings.insert(
                pos,
                Posting {
                    doc_id,
                    positions: vec![entry],
                },
            ),
        }
    }

    /// Sort and deduplicate the entries of every document.
    pub fn optimize(&mut self) {
        for posting in &mut self.postings {
            posting.positions.sort_unstable();
            posting.positions.dedup();
        }
    }

    pub fn doc_frequency(&self) -> usize {
        self.postings.len()
    }

    pub fn total_frequency(&self) -> usize {
        self.postings.iter().map(|p| p.positions.len()).sum()
    }

    pub fn cursor(&self) -> PostingCursor<'_> {
        PostingCursor::new(&self.postings)
    }

    pub fn encode<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_string(&self.term)?;
        writer.write_varint(self.postings.len() as u64)?;

        let mut prev_doc_id = 0u32;
        for posting in &self.postings {
            writer.write_varint((posting.doc_id - prev_doc_id) as u64)?;
            prev_doc_id = posting.doc_id;

            writer.write_varint(posting.positions.len() as u64)?;
            let mut prev_start = 0u32;
            for entry in &posting.positions {
                // Starts ascend; the length and payload are stored as is.
                writer.write_varint((entry.start - prev_start) as u64)?;
                writer.write_varint((entry.end - entry.start) as u64)?;
                match entry.payload {
                    Some(payload) => {
                        writer.write_u8(1)?;
                        writer.write_varint(payload as u64)?;
                    }
                    None => writer.write_u8(0)?,
                }
                prev_start = entry.start;
            }
        }

        Ok(())
    }

    pub fn decode<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Self> {
        let term = reader.read_string()?;
        let posting_count = reader.read_length()?;

        let mut postings = Vec::with_capacity(posting_count);
        let mut prev_doc_id = 0u32;

        for _ in 0..posting_count {
            let doc_id = prev_doc_id + reader.read_varint_u32()?;
            prev_doc_id = doc_id;

            let entry_count = reader.read_length()?;
            let mut positions = Vec::with_capacity(entry_count);
            let mut prev_start = 0u32;
            for _ in 0..entry_count {
                let start = prev_start + reader.read_varint_u32()?;
                let end = start + reader.read_varint_u32()?;
                let payload = match reader.read_u8()? {
                    0 => None,
                    1 => Some(reader.read_varint_u32()?),
                    flag => {
                        return Err(TesseraError::storage(format!(
                            "Invalid payload flag {flag} in postings of {term}"
                        )));
                    }
                };
                positions.push(PositionEntry {
                    start,
                    end,
                    payload,
                });
                prev_start = start;
            }

            postings.push(Posting { doc_id, positions });
        }

        Ok(PostingList { term, postings })
    }
}

/// A forward-only cursor over the documents of a posting list.
///
/// The cursor starts before the first document; [`PostingCursor::advance`]
/// and [`PostingCursor::skip_to`] move it, and once past the last document it
/// stays exhausted.
#[derive(Debug, Clone)]
pub struct PostingCursor<'a> {
    postings: &'a [Posting],
    index: Option<usize>,
}

impl<'a> PostingCursor<'a> {
    pub fn new(postings: &'a [Posting]) -> Self {
        PostingCursor {
            postings,
            index: None,
        }
    }

    pub fn empty() -> Self {
        PostingCursor::new(&[])
    }

    /// Current document, `None` before the first advance or when exhausted.
    pub fn doc(&self) -> Option<DocId> {
        self.index
            .and_then(|i| self.postings.get(i))
            .map(|posting| posting.doc_id)
    }

    pub fn advance(&mut self) -> Option<DocId> {
        let next = self.index.map_or(0, |i| i.saturating_add(1));
        self.index = Some(next.min(self.postings.len()));
        self.doc()
    }

    /// Move to the first document `>= target`, never backwards.
    pub fn skip_to(&mut self, target: DocId) -> Option<DocId> {
        let from = self.index.unwrap_or(0);
        if from >= self.postings.len() {
            self.index = Some(self.postings.len());
            return None;
        }
        let offset = self.postings[from..].partition_point(|p| p.doc_id < target);
        self.index = Some(from + offset);
        self.doc()
    }

    pub fn is_exhausted(&self) -> bool {
        self.index.is_some_and(|i| i >= self.postings.len())
    }

    /// Entries of the current document.
    pub fn positions(&self) -> &'a [PositionEntry] {
        let postings = self.postings;
        self.index
            .and_then(|i| postings.get(i))
            .map(|posting| posting.positions.as_slice())
            .unwrap_or(&[])
    }

    /// Number of documents in the list.
    pub fn cost(&self) -> u64 {
        self.postings.len() as u64
    }
}

/// The term dictionary of one segment.
#[derive(Debug, Clone, Default)]
pub struct PostingIndex {
    terms: AHashMap<String, PostingList>,
}

impl PostingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every token term, element and page break of `doc`.
    pub fn add_document(&mut self, doc_id: DocId, doc: &AnnotatedDocument) {
        for (position, token) in doc.tokens.iter().enumerate() {
            let position = position as u32;
            for term in &token.terms {
                self.add(term, doc_id, PositionEntry::new(position, position + 1));
            }
        }

        for element in &doc.elements {
            let mut entry = PositionEntry::new(element.start, element.end);
            entry.payload = element.payload;
            self.add(&element.term, doc_id, entry);
        }

        for page_break in &doc.page_breaks {
            self.add(
                PAGE_BREAK_TERM,
                doc_id,
                PositionEntry::new(page_break.position, page_break.position)
                    .with_payload(page_break.page),
            );
        }
    }

    fn add(&mut self, term: &str, doc_id: DocId, entry: PositionEntry) {
        match self.terms.get_mut(term) {
            Some(list) => list.add_entry(doc_id, entry),
            None => {
                let mut list = PostingList::new(term.to_string());
                list.add_entry(doc_id, entry);
                self.terms.insert(term.to_string(), list);
            }
        }
    }

    pub fn optimize(&mut self) {
        for list in self.terms.values_mut() {
            list.optimize();
        }
    }

    pub fn get(&self, term: &str) -> Option<&PostingList> {
        self.terms.get(term)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Terms in byte order, for deterministic serialization.
    pub fn sorted_terms(&self) -> Vec<&str> {
        let mut terms: Vec<&str> = self.terms.keys().map(String::as_str).collect();
        terms.sort_unstable();
        terms
    }

    pub fn encode<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_varint(self.terms.len() as u64)?;
        for term in self.sorted_terms() {
            if let Some(list) = self.terms.get(term) {
                list.encode(writer)?;
            }
        }
        Ok(())
    }

    pub fn decode<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Self> {
        let term_count = reader.read_length()?;
        let mut terms = AHashMap::with_capacity(term_count);
        for _ in 0..term_count {
            let list = PostingList::decode(reader)?;
            terms.insert(list.term.clone(), list);
        }
        Ok(PostingIndex { terms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};

    fn sample_list() -> PostingList {
        let mut list = PostingList::new("s:b".to_string());
        list.add_entry(4, PositionEntry::new(2, 3));
        list.add_entry(1, PositionEntry::new(5, 6));
        list.add_entry(1, PositionEntry::new(0, 1));
        list.add_entry(9, PositionEntry::new(1, 1).with_payload(12));
        list.optimize();
        list
    }

    #[test]
    fn test_add_entry_keeps_order() {
        let list = sample_list();
        let docs: Vec<DocId> = list.postings.iter().map(|p| p.doc_id).collect();
        assert_eq!(docs, vec![1, 4, 9]);
        assert_eq!(list.postings[0].positions[0], PositionEntry::new(0, 1));
        assert_eq!(list.doc_frequency(), 3);
        assert_eq!(list.total_frequency(), 4);
    }

    #[test]
    fn test_cursor_skip_to() {
        let list = sample_list();
        let mut cursor = list.cursor();

        assert_eq!(cursor.doc(), None);
        assert_eq!(cursor.skip_to(2), Some(4));
        // Never moves backwards.
        assert_eq!(cursor.skip_to(0), Some(4));
        assert_eq!(cursor.positions(), &[PositionEntry::new(2, 3)]);
        assert_eq!(cursor.advance(), Some(9));
        assert_eq!(cursor.advance(), None);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.skip_to(100), None);
        assert!(cursor.positions().is_empty());
    }

    #[test]
    fn test_encode_decode() {
        let storage = MemoryStorage::new_default();
        let list = sample_list();
        {
            let mut writer = StructWriter::new(storage.create_output("p").unwrap());
            list.encode(&mut writer).unwrap();
            writer.close().unwrap();
        }

        let mut reader = StructReader::new(storage.open_input("p").unwrap()).unwrap();
        let decoded = PostingList::decode(&mut reader).unwrap();
        assert!(reader.verify_checksum().unwrap());
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_posting_index_from_document() {
        let mut doc = AnnotatedDocument::from_text("Ein Baum. Ein Haus.");
        doc.add_page_break(2, 3);

        let mut index = PostingIndex::new();
        index.add_document(0, &doc);
        index.optimize();

        let ein = index.get("s:Ein").unwrap();
        assert_eq!(
            ein.postings[0].positions,
            vec![PositionEntry::new(0, 1), PositionEntry::new(2, 3)]
        );

        let sentences = index.get("<>:base/s:s").unwrap();
        assert_eq!(sentences.total_frequency(), 2);

        let pb = index.get(PAGE_BREAK_TERM).unwrap();
        assert_eq!(
            pb.postings[0].positions,
            vec![PositionEntry::new(2, 2).with_payload(3)]
        );

        assert!(index.sorted_terms().windows(2).all(|w| w[0] < w[1]));
    }
}
