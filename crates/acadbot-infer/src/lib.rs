//! AcadBot Infer: embedding providers, batched embedding, query cache.
//!
//! `EmbeddingProvider` abstracts over the vector source. `OpenAIEmbedder`
//! calls the hosted embeddings API; `HashingEmbedder` is an offline,
//! deterministic fallback used when no API key is configured.

pub mod batch;
pub mod cache;
pub mod embedder;
pub mod hashing;
pub mod openai;

pub use batch::{embed_all, embed_with_timeout, BatchOptions};
pub use cache::QueryCache;
pub use embedder::{check_vectors, EmbeddingProvider};
pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;

use std::sync::Arc;
use std::time::Duration;

use acadbot_core::Result;

/// Create the best available embedder.
///
/// Uses OpenAI when an API key is present, falls back to the hashing embedder.
pub fn create_embedder(
    openai_api_key: Option<&str>,
    model: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match openai_api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let mut embedder = OpenAIEmbedder::new(key, timeout)?;
            if let Some(model) = model {
                embedder = embedder.with_model(model);
            }
            tracing::info!(
                "Using OpenAI embedder (model={}, dim={})",
                embedder.model_id(),
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        None => {
            let embedder = HashingEmbedder::default();
            tracing::warn!(
                "No OpenAI API key configured. Using offline {} embedder.",
                embedder.model_id()
            );
            Ok(Arc::new(embedder))
        }
    }
}
