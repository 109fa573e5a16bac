//! In-memory vector index with exact cosine search.

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::embedding::normalized;
use crate::types::{EmbeddingRecord, IndexManifest, RetrievalHit, RetrievalResult};
use acadbot_core::{Error, Result};

/// Embedding records plus a pre-normalised (N, dim) matrix for search.
#[derive(Debug)]
pub struct VectorIndex {
    manifest: IndexManifest,
    records: Vec<EmbeddingRecord>,
    matrix: Array2<f32>,
}

impl VectorIndex {
    /// Assemble an index. Every vector must have `manifest.dimension` entries.
    pub fn new(mut manifest: IndexManifest, records: Vec<EmbeddingRecord>) -> Result<Self> {
        let dim = manifest.dimension;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
            return Err(Error::Storage(format!(
                "record {} has dimension {}, index dimension is {}",
                bad.chunk.id,
                bad.vector.len(),
                dim
            )));
        }

        let mut matrix = Array2::<f32>::zeros((records.len(), dim));
        for (mut row, record) in matrix.rows_mut().into_iter().zip(&records) {
            let v = Array1::from_vec(record.vector.clone());
            row.assign(&normalized(v.view()));
        }

        manifest.record_count = records.len();
        Ok(Self {
            manifest,
            records,
            matrix,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    /// Top-k chunks by cosine similarity, best first, ties in insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if query.len() != self.dimension() {
            return Err(Error::IndexMismatch {
                expected: format!("dimension {}", self.dimension()),
                found: format!("dimension {}", query.len()),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(RetrievalResult::default());
        }

        let q = Array1::from_vec(query.to_vec());
        let q = normalized(q.view());

        // (N, dim) @ (dim,) -> (N,)
        let similarities = self.matrix.dot(&q);

        let mut indexed: Vec<(usize, f32)> = similarities.iter().copied().enumerate().collect();
        // Stable sort keeps insertion order among equal scores.
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.truncate(k);

        let hits: Vec<RetrievalHit> = indexed
            .into_iter()
            .enumerate()
            .map(|(rank, (i, score))| RetrievalHit {
                chunk: self.records[i].chunk.clone(),
                score,
                rank: rank + 1,
            })
            .collect();

        debug!(
            "Vector search over {} rows returned {} hits",
            self.len(),
            hits.len()
        );
        Ok(RetrievalResult { hits })
    }
}
