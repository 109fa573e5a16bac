//! Embedding provider trait.
//!
//! Implementations:
//! - `OpenAIEmbedder`: hosted `text-embedding-3-*` models over HTTP
//! - `HashingEmbedder`: offline feature hashing, no network

use async_trait::async_trait;

use acadbot_core::{Error, ProviderFailure, Result};

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier recorded in the index manifest.
    fn model_id(&self) -> &str;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Verify that a provider returned one vector of the declared dimension per input.
pub fn check_vectors(dimension: usize, inputs: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != inputs {
        return Err(Error::embedding(
            ProviderFailure::MalformedResponse,
            format!("expected {} vectors, provider returned {}", inputs, vectors.len()),
        ));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(Error::embedding(
            ProviderFailure::MalformedResponse,
            format!(
                "vector {} has dimension {}, expected {}",
                i,
                v.len(),
                dimension
            ),
        ));
    }
    Ok(())
}
