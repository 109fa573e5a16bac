//! Batched, bounded-concurrency embedding with per-call timeouts.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::embedder::{check_vectors, EmbeddingProvider};
use acadbot_core::{Error, ProviderFailure, Result};

/// How a large set of texts is split into provider calls.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Texts per provider call.
    pub batch_size: usize,
    /// Provider calls in flight at once.
    pub max_concurrency: usize,
    /// Upper bound on each provider call.
    pub timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

/// One provider call under a timeout, with the response shape verified.
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let vectors = tokio::time::timeout(timeout, provider.embed(texts))
        .await
        .map_err(|_| {
            Error::embedding(
                ProviderFailure::Timeout,
                format!("embedding call exceeded {}s", timeout.as_secs_f32()),
            )
        })??;
    check_vectors(provider.dimension(), texts.len(), &vectors)?;
    Ok(vectors)
}

/// Embed all texts in order. Any failed batch fails the whole call.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    opts: &BatchOptions,
) -> Result<Vec<Vec<f32>>> {
    if opts.batch_size == 0 || opts.max_concurrency == 0 {
        return Err(Error::Config(
            "batch_size and max_concurrency must be greater than zero".into(),
        ));
    }
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let total = texts.len().div_ceil(opts.batch_size);
    debug!(
        "Embedding {} texts in {} batches of up to {}",
        texts.len(),
        total,
        opts.batch_size
    );
    // Futures are built eagerly so the combined future stays Send.
    let calls: Vec<_> = texts
        .chunks(opts.batch_size)
        .map(|batch| embed_with_timeout(provider, batch, opts.timeout))
        .collect();
    let batches: Vec<Vec<Vec<f32>>> = stream::iter(calls)
        .buffered(opts.max_concurrency)
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
        fn model_id(&self) -> &str {
            "counting"
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
        fn model_id(&self) -> &str {
            "slow"
        }
        fn dimension(&self) -> usize {
            1
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0]).collect())
        }
        fn model_id(&self) -> &str {
            "short"
        }
        fn dimension(&self) -> usize {
            1
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_order_preserved_and_concurrency_bounded() {
        let provider = CountingEmbedder {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let opts = BatchOptions {
            batch_size: 3,
            max_concurrency: 2,
            timeout: Duration::from_secs(5),
        };
        let input = texts(10);
        let vectors = embed_all(&provider, &input, &opts).await.unwrap();

        assert_eq!(vectors.len(), 10);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_is_embedding_error() {
        let opts = BatchOptions {
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let err = embed_all(&SlowEmbedder, &texts(2), &opts).await.unwrap_err();
        assert_eq!(err.provider_failure(), Some(ProviderFailure::Timeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_short_response_fails_whole_call() {
        let err = embed_all(&ShortEmbedder, &texts(4), &BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.provider_failure(), Some(ProviderFailure::MalformedResponse));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let vectors = embed_all(&HashingEmbedder::default(), &[], &BatchOptions::default())
            .await
            .unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_config_error() {
        let opts = BatchOptions {
            batch_size: 0,
            ..Default::default()
        };
        let err = embed_all(&HashingEmbedder::default(), &texts(1), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
