//! Revision fingerprints.
//!
//! A fingerprint identifies the committed content of an index. Per segment it
//! covers the name, the deletion generation, the document and deletion
//! counts, the content digest of the segment body and the deletion bitset.
//! Equal sequences of adds, deletes and commits therefore give equal
//! fingerprints, whether replayed on a fresh index or read back from a
//! persisted one, while a different document or a different deleted document
//! gives a different one.

use xxhash_rust::xxh3::xxh3_128;

use crate::index::segment::Segment;

/// Fingerprint of an index that has never been committed.
pub const NULL_FINGERPRINT: &str = "null";

/// Order-sensitive digest over `segments`, as 32 lowercase hex digits.
pub fn fingerprint_of<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'a Segment>,
{
    let mut buf = Vec::new();
    for segment in segments {
        let info = segment.info();
        buf.extend_from_slice(info.name.as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(&info.del_gen.to_le_bytes());
        buf.extend_from_slice(&info.doc_count.to_le_bytes());
        buf.extend_from_slice(&info.del_count.to_le_bytes());
        buf.extend_from_slice(&info.content_digest.to_le_bytes());

        let deletions = segment.deletions().to_bytes();
        buf.extend_from_slice(&(deletions.len() as u64).to_le_bytes());
        buf.extend_from_slice(&deletions);
    }
    format!("{:032x}", xxh3_128(&buf))
}
