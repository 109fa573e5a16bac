//! Retriever: question -> query vector -> top-k chunks.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::types::validate_query;
use acadbot_core::{Error, Result};
use acadbot_infer::{embed_with_timeout, EmbeddingProvider, QueryCache};
use acadbot_store::{IndexManifest, RetrievalResult, VectorIndex};

/// Embeds questions with the configured provider and searches an index.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    cache: QueryCache,
    timeout: Duration,
}

impl Retriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            cache: QueryCache::default_cache(),
            timeout,
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// The index must have been built with this retriever's model and dimension.
    pub fn check_compatible(&self, manifest: &IndexManifest) -> Result<()> {
        let model = self.provider.model_id();
        let dim = self.provider.dimension();
        if manifest.model_id != model || manifest.dimension != dim {
            return Err(Error::IndexMismatch {
                expected: format!("{} (dim {})", manifest.model_id, manifest.dimension),
                found: format!("{} (dim {})", model, dim),
            });
        }
        Ok(())
    }

    /// Query vector for a question, served from the cache when possible.
    pub async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        if let Some(v) = self.cache.get(question) {
            debug!("Query embedding cache hit");
            return Ok(v);
        }
        let mut vectors =
            embed_with_timeout(self.provider.as_ref(), &[question.to_string()], self.timeout)
                .await?;
        let vector = vectors.pop().ok_or_else(|| {
            Error::Internal("provider returned no vector for the query".into())
        })?;
        self.cache.put(question.to_string(), vector.clone());
        Ok(vector)
    }

    /// Top-k chunks for a question. Does not modify the index.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        question: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        validate_query(question, k)?;
        self.check_compatible(index.manifest())?;
        if index.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let query = self.embed_query(question).await?;
        let result = index.search(&query, k)?;
        debug!(
            "Retrieved {} chunks (top score {:?})",
            result.len(),
            result.hits.first().map(|h| h.score)
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acadbot_core::ProviderFailure;
    use acadbot_infer::HashingEmbedder;
    use acadbot_store::{Chunk, EmbeddingRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn build_index(embedder: &HashingEmbedder, texts: &[&str]) -> VectorIndex {
        let records = texts
            .iter()
            .enumerate()
            .map(|(i, t)| EmbeddingRecord {
                chunk: Chunk {
                    id: Chunk::make_id("course.pdf", i),
                    source: "course.pdf".into(),
                    page: i + 1,
                    chunk_index: i,
                    start_token: 0,
                    end_token: 0,
                    char_start: 0,
                    char_end: t.len(),
                    text: t.to_string(),
                },
                vector: embedder.embed_text(t),
            })
            .collect();
        VectorIndex::new(
            IndexManifest {
                model_id: embedder.model_id().to_string(),
                dimension: embedder.dimension(),
                chunk_size: 300,
                chunk_overlap: 50,
                corpus_fingerprint: String::new(),
                built_at: chrono::Utc::now(),
                record_count: 0,
            },
            records,
        )
        .unwrap()
    }

    struct CountingProvider {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(texts).await
        }
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl EmbeddingProvider for HangingProvider {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Vec::new())
        }
        fn model_id(&self) -> &str {
            "hashing-v1-512"
        }
        fn dimension(&self) -> usize {
            512
        }
    }

    const COURSE: &[&str] = &[
        "Backpropagation applies the chain rule to compute the gradient of the loss.",
        "Convolutional layers share weights across spatial positions.",
        "The French Revolution began in 1789.",
    ];

    #[tokio::test]
    async fn test_on_topic_beats_unrelated() {
        let embedder = HashingEmbedder::default();
        let index = build_index(&embedder, COURSE);
        let retriever = Retriever::new(Arc::new(embedder), Duration::from_secs(5));

        let result = retriever
            .retrieve(&index, "How does backpropagation use the chain rule?", 3)
            .await
            .unwrap();
        assert_eq!(result.hits[0].chunk.chunk_index, 0);
        assert!(result.hits[0].score > result.hits[2].score);
    }

    #[tokio::test]
    async fn test_query_embedding_is_cached() {
        let embedder = HashingEmbedder::default();
        let index = build_index(&embedder, COURSE);
        let provider = Arc::new(CountingProvider {
            inner: embedder,
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(provider.clone(), Duration::from_secs(5));

        retriever.retrieve(&index, "weights", 1).await.unwrap();
        retriever.retrieve(&index, "weights", 2).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_mismatch_requires_rebuild() {
        let index = build_index(&HashingEmbedder::new(64), COURSE);
        let retriever = Retriever::new(Arc::new(HashingEmbedder::new(128)), Duration::from_secs(5));
        let err = retriever.retrieve(&index, "gradient", 3).await.unwrap_err();
        assert!(matches!(err, Error::IndexMismatch { .. }));
        assert!(err.to_string().contains("rebuild"));
    }

    #[tokio::test]
    async fn test_embedding_timeout() {
        let index = build_index(&HashingEmbedder::default(), COURSE);
        let retriever = Retriever::new(Arc::new(HangingProvider), Duration::from_millis(20));
        let err = retriever.retrieve(&index, "gradient", 3).await.unwrap_err();
        assert_eq!(err.provider_failure(), Some(ProviderFailure::Timeout));
    }

    #[tokio::test]
    async fn test_empty_index_and_invalid_input() {
        let embedder = HashingEmbedder::default();
        let index = build_index(&embedder, &[]);
        let retriever = Retriever::new(Arc::new(embedder), Duration::from_secs(5));

        assert!(retriever.retrieve(&index, "anything", 3).await.unwrap().is_empty());
        assert!(matches!(
            retriever.retrieve(&index, "   ", 3).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            retriever.retrieve(&index, "q", 0).await,
            Err(Error::InvalidRequest(_))
        ));
    }
}
