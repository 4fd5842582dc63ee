//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use tessera::index::{AnnotatedDocument, Index};

/// One token per character, annotated `s:{c}` and `i:{c}`, plus extra terms
/// at selected positions.
pub fn char_doc(uid: &str, text: &str, extra: &[(u32, &str)]) -> AnnotatedDocument {
    let mut doc = AnnotatedDocument::new(text).with_field("uid", uid);
    for (i, c) in text.chars().enumerate() {
        let i = i as u32;
        doc.add_token(i, i + 1, [format!("s:{c}"), format!("i:{}", c.to_lowercase())]);
    }
    for &(position, term) in extra {
        doc.annotate(position, term).unwrap();
    }
    doc
}

/// A committed in-memory index holding `docs` in one segment.
pub fn index_of(docs: Vec<AnnotatedDocument>) -> Index {
    let index = Index::create_in_memory();
    index.add_documents(docs).unwrap();
    index.commit().unwrap();
    index
}

/// The two-document character fixture; position 1 of the second document
/// and position 4 of both carry an additional surface term.
pub fn krill_index() -> Index {
    index_of(vec![
        char_doc("doc-0", "abcabcabac", &[(4, "s:c")]),
        char_doc("doc-1", "bcbabd", &[(1, "s:b"), (4, "s:c")]),
    ])
}

/// Sentences of plain text, one document each, with `uid` fields.
pub fn text_index(texts: &[&str]) -> Index {
    index_of(
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| AnnotatedDocument::from_text(*text).with_field("uid", format!("t{i}")))
            .collect(),
    )
}
