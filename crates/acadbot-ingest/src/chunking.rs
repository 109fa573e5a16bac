//! Token-window chunking.
//!
//! Text is segmented into units: a run of non-whitespace characters plus
//! the whitespace that follows it. The first unit also takes any leading
//! whitespace, and runs longer than [`MAX_UNIT_CHARS`] are cut every
//! [`MAX_UNIT_CHARS`] characters. Units tile the text exactly, so a chunk
//! is a byte range and overlapping chunks can be stitched back together.

use std::ops::Range;

use crate::file::{page_at, Document};
use acadbot_core::config::validate_chunking;
use acadbot_core::Result;
use acadbot_store::Chunk;

/// Longest unit, in characters.
pub const MAX_UNIT_CHARS: usize = 16;

/// Split text into token units (byte ranges). Whitespace-only text has none.
pub fn segment(text: &str) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut start = 0;

    while chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}

    loop {
        let mut taken = 0;
        while taken < MAX_UNIT_CHARS
            && chars.next_if(|&(_, c)| !c.is_whitespace()).is_some()
        {
            taken += 1;
        }
        if taken == 0 {
            break;
        }

        // Cut a long run without consuming whitespace.
        let run_continues = matches!(chars.peek(), Some(&(_, c)) if !c.is_whitespace());
        if !run_continues {
            while chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
        }

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        units.push(start..end);
        start = end;
    }
    units
}

/// Splits documents into overlapping fixed-size token windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap` must be less than `chunk_size`, which must be non-zero.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk one document. Consecutive chunks start `chunk_size - chunk_overlap` units apart.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text();
        let units = segment(&text);
        if units.is_empty() {
            return Vec::new();
        }

        let page_starts = document.page_starts();
        let step = self.chunk_size - self.chunk_overlap;
        let n = units.len();
        let mut chunks = Vec::with_capacity(n / step + 1);
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(n);
            let char_start = units[start].start;
            let char_end = units[end - 1].end;
            let chunk_index = chunks.len();

            chunks.push(Chunk {
                id: Chunk::make_id(&document.id, chunk_index),
                source: document.id.clone(),
                page: page_at(&page_starts, char_start),
                chunk_index,
                start_token: start,
                end_token: end,
                char_start,
                char_end,
                text: text[char_start..char_end].to_string(),
            });

            if end == n {
                break;
            }
            start += step;
        }
        chunks
    }

    /// Chunk a sequence of documents, keeping document order.
    pub fn chunk_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.chunk(d)).collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: acadbot_core::config::DEFAULT_CHUNK_SIZE,
            chunk_overlap: acadbot_core::config::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Stitch chunks of one document back into its text.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.char_start);
        text.push_str(&chunk.text[skip..]);
        covered = chunk.char_end;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use acadbot_core::Error;
    use proptest::prelude::*;

    fn doc(text: &str) -> Document {
        Document::new("notes.pdf", "notes.pdf", vec![text.to_string()])
    }

    fn unit_strs(text: &str) -> Vec<&str> {
        segment(text).into_iter().map(|r| &text[r]).collect()
    }

    #[test]
    fn test_segment_units() {
        assert_eq!(unit_strs("  the chain  rule\n"), vec!["  the ", "chain  ", "rule\n"]);
        assert_eq!(
            unit_strs("abcdefghijklmnopqrstu v"),
            vec!["abcdefghijklmnop", "qrstu ", "v"]
        );
        assert!(segment("").is_empty());
        assert!(segment(" \n\t ").is_empty());
    }

    #[test]
    fn test_segment_multibyte() {
        let text = "ééééééééééééééééé x";
        let units = unit_strs(text);
        assert_eq!(units[0].chars().count(), 16);
        assert_eq!(units.concat(), text);
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(Chunker::new(10, 10), Err(Error::Config(_))));
        assert!(matches!(Chunker::new(10, 12), Err(Error::Config(_))));
        assert!(matches!(Chunker::new(0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_short_document_single_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk(&doc("Backpropagation computes gradients."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Backpropagation computes gradients.");
        assert_eq!(chunks[0].id, "notes.pdf#0");
        assert_eq!(chunks[0].page, 1);
    }

    #[test]
    fn test_empty_document_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.chunk(&doc("")).is_empty());
        assert!(chunker.chunk(&doc("   \n  ")).is_empty());
    }

    #[test]
    fn test_windows_and_overlap() {
        let chunker = Chunker::new(4, 1).unwrap();
        let text = "a b c d e f g h i j";
        let chunks = chunker.chunk(&doc(text));

        let ranges: Vec<(usize, usize)> =
            chunks.iter().map(|c| (c.start_token, c.end_token)).collect();
        assert_eq!(ranges, vec![(0, 4), (3, 7), (6, 10)]);
        assert_eq!(chunks[0].text, "a b c d ");
        assert_eq!(chunks[1].text, "d e f g ");
        assert_eq!(chunks[2].text, "g h i j");
        assert!(chunks.iter().enumerate().all(|(i, c)| c.chunk_index == i));
    }

    #[test]
    fn test_page_of_first_character() {
        let document = Document::new(
            "deck.pdf",
            "deck.pdf",
            vec!["one two three".into(), "four five six".into()],
        );
        let chunker = Chunker::new(2, 0).unwrap();
        let pages: Vec<usize> = chunker.chunk(&document).iter().map(|c| c.page).collect();
        // Units: "one ", "two ", "three\n", "four ", "five ", "six"
        assert_eq!(pages, vec![1, 1, 2]);
    }

    #[test]
    fn test_chunk_all_keeps_document_order() {
        let chunker = Chunker::default();
        let docs = vec![
            Document::new("a.pdf", "a.pdf", vec!["alpha".into()]),
            Document::new("b.pdf", "b.pdf", vec!["beta".into()]),
        ];
        let sources: Vec<String> = chunker.chunk_all(&docs).into_iter().map(|c| c.source).collect();
        assert_eq!(sources, vec!["a.pdf", "b.pdf"]);
    }

    proptest! {
        #[test]
        fn prop_chunks_reassemble_to_text(
            text in "[a-z \\n\\t]{0,400}|[a-zé ]{0,200}",
            size in 1usize..40,
            overlap_frac in 0.0f64..1.0,
        ) {
            let overlap = ((size as f64) * overlap_frac) as usize % size;
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&doc(&text));

            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(reassemble(&chunks), text.clone());
                for c in &chunks {
                    prop_assert!(c.end_token - c.start_token <= size);
                }
                for pair in chunks.windows(2) {
                    prop_assert_eq!(pair[1].start_token, pair[0].start_token + size - overlap);
                }
            }
        }
    }
}
