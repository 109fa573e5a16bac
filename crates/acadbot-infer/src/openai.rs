//! OpenAI embedding provider using the `/v1/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedder::EmbeddingProvider;
use acadbot_core::{Error, ProviderFailure, Result};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Output dimension of the known OpenAI embedding models.
pub fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl std::fmt::Debug for OpenAIEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbedder")
            .field("api_key", &"[redacted]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OpenAIEmbedder {
    /// Create a provider with the default model. Every request is bounded by `timeout`.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("OpenAI API key must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            endpoint: OPENAI_EMBEDDINGS_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimension: model_dimension(DEFAULT_MODEL),
        })
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.dimension = model_dimension(&self.model);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Classify a transport-level failure.
pub(crate) fn classify_send_error(e: &reqwest::Error) -> ProviderFailure {
    if e.is_timeout() {
        ProviderFailure::Timeout
    } else if let Some(status) = e.status() {
        ProviderFailure::from_status(status.as_u16())
    } else {
        ProviderFailure::Unavailable
    }
}

/// Restore input order from the `index` field of each item.
fn into_ordered(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    data.sort_by_key(|d| d.index);
    if data.iter().enumerate().any(|(i, d)| d.index != i) || data.len() != expected {
        return Err(Error::embedding(
            ProviderFailure::MalformedResponse,
            format!(
                "response indices do not cover the {} inputs",
                expected
            ),
        ));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("OpenAI embedding batch of {} (model={})", texts.len(), self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI embedding request failed: {}", e);
                Error::embedding(classify_send_error(&e), format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!("OpenAI embeddings API returned {}", status);
            return Err(Error::embedding(
                ProviderFailure::from_status(status.as_u16()),
                format!("API returned {}: {}", status, detail),
            ));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            Error::embedding(
                ProviderFailure::MalformedResponse,
                format!("failed to parse response: {}", e),
            )
        })?;

        into_ordered(parsed.data, texts.len())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
