//! Data types for chunks, embedding records, manifests and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous token window over one document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<source>#<chunk_index>`, unique within a corpus.
    pub id: String,
    /// Source document identifier (the PDF file name).
    pub source: String,
    /// 1-based page containing the first character.
    pub page: usize,
    /// Position within the source document.
    pub chunk_index: usize,
    pub start_token: usize,
    pub end_token: usize,
    /// Byte range in the document text.
    pub char_start: usize,
    pub char_end: usize,
    pub text: String,
}

impl Chunk {
    pub fn make_id(source: &str, chunk_index: usize) -> String {
        format!("{}#{}", source, chunk_index)
    }
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Build parameters recorded alongside the vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub model_id: String,
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub corpus_fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub record_count: usize,
}

impl IndexManifest {
    /// Whether an index with this manifest can serve the given build parameters.
    pub fn matches(
        &self,
        model_id: &str,
        dimension: usize,
        chunk_size: usize,
        chunk_overlap: usize,
        corpus_fingerprint: &str,
    ) -> bool {
        self.model_id == model_id
            && self.dimension == dimension
            && self.chunk_size == chunk_size
            && self.chunk_overlap == chunk_overlap
            && self.corpus_fingerprint == corpus_fingerprint
    }
}

/// One scored chunk in a retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub score: f32,
    /// 1-based position in the result.
    pub rank: usize,
}

/// Ordered hits for one query, best first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|h| &h.chunk)
    }
}
