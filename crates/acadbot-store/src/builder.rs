//! Index construction: embed every chunk, then assemble a fresh index.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::index::VectorIndex;
use crate::types::{Chunk, EmbeddingRecord, IndexManifest};
use acadbot_core::Result;
use acadbot_infer::{embed_all, BatchOptions, EmbeddingProvider};

/// Chunking parameters and corpus identity recorded in the manifest.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub corpus_fingerprint: String,
}

/// Builds a [`VectorIndex`] from chunks through an embedding provider.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    batch: BatchOptions,
}

impl IndexBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch: BatchOptions) -> Self {
        Self { provider, batch }
    }

    /// Embed all chunks. Any provider failure fails the build; nothing partial is returned.
    pub async fn build(&self, chunks: Vec<Chunk>, params: BuildParams) -> Result<VectorIndex> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(self.provider.as_ref(), &texts, &self.batch).await?;

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord { chunk, vector })
            .collect();

        let manifest = IndexManifest {
            model_id: self.provider.model_id().to_string(),
            dimension: self.provider.dimension(),
            chunk_size: params.chunk_size,
            chunk_overlap: params.chunk_overlap,
            corpus_fingerprint: params.corpus_fingerprint,
            built_at: Utc::now(),
            record_count: records.len(),
        };

        let index = VectorIndex::new(manifest, records)?;
        info!(
            "Built index: {} records with {} (dim={})",
            index.len(),
            index.manifest().model_id,
            index.dimension()
        );
        Ok(index)
    }
}
