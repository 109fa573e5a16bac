//! Completion providers.
//!
//! OpenAI and Groq share the chat-completions format; Anthropic uses the
//! Messages API with the system prompt as a separate field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::LLMConfig;
use crate::types::{ChatMessage, CompletionParams, LLMProvider};
use acadbot_core::{Error, ProviderFailure, Result};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Trait for text generation backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a conversation. Returns the model's text verbatim.
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams)
        -> Result<String>;

    /// Model name reported with answers.
    fn model(&self) -> &str;
}

/// Hosted LLM reached over HTTPS.
pub struct HttpCompletionProvider {
    client: Client,
    provider: LLMProvider,
    model: String,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for HttpCompletionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionProvider")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"[redacted]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpCompletionProvider {
    pub fn new(
        provider: LLMProvider,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        let endpoint = match provider {
            LLMProvider::OpenAI => OPENAI_CHAT_URL,
            LLMProvider::Groq => GROQ_CHAT_URL,
            LLMProvider::Anthropic => ANTHROPIC_MESSAGES_URL,
        };
        Ok(Self {
            client,
            provider,
            model: model.into(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Provider selected by the config, or `None` when no key is configured.
    pub fn from_config(config: &LLMConfig, timeout: Duration) -> Result<Option<Self>> {
        match config.resolve_provider() {
            Some((provider, model, key)) => Ok(Some(Self::new(provider, model, key, timeout)?)),
            None => Ok(None),
        }
    }

    pub fn provider(&self) -> LLMProvider {
        self.provider
    }

    fn request_body(&self, messages: &[ChatMessage], params: &CompletionParams) -> Value {
        match self.provider {
            LLMProvider::OpenAI | LLMProvider::Groq => json!({
                "model": self.model,
                "messages": messages
                    .iter()
                    .map(|m| json!({"role": m.role, "content": m.content}))
                    .collect::<Vec<_>>(),
                "temperature": params.temperature,
                "max_tokens": params.max_tokens,
            }),
            LLMProvider::Anthropic => {
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == "system")
                    .map(|m| m.content.as_str())
                    .collect();
                let conv: Vec<Value> = messages
                    .iter()
                    .filter(|m| m.role != "system")
                    .map(|m| json!({"role": m.role, "content": m.content}))
                    .collect();
                let mut body = json!({
                    "model": self.model,
                    "messages": conv,
                    "temperature": params.temperature,
                    "max_tokens": params.max_tokens,
                });
                if !system.is_empty() {
                    body["system"] = json!(system.join("\n\n"));
                }
                body
            }
        }
    }
}

/// Pull the reply text out of a provider response body.
fn extract_text(provider: LLMProvider, body: &Value) -> Option<String> {
    match provider {
        LLMProvider::OpenAI | LLMProvider::Groq => body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string),
        LLMProvider::Anthropic => {
            let blocks = body["content"].as_array()?;
            let text: Vec<&str> = blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.concat())
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<String> {
        let body = self.request_body(messages, params);
        debug!("Completion via {} with model {}", self.provider, self.model);

        let request = self.client.post(&self.endpoint).json(&body);
        let request = match self.provider {
            LLMProvider::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            LLMProvider::OpenAI | LLMProvider::Groq => request.bearer_auth(&self.api_key),
        };

        let response = request.send().await.map_err(|e| {
            error!("{} request failed: {}", self.provider, e);
            let kind = if e.is_timeout() {
                ProviderFailure::Timeout
            } else {
                ProviderFailure::Unavailable
            };
            Error::generation(kind, format!("Request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            error!("{} API error {}", self.provider, status);
            return Err(Error::generation(
                ProviderFailure::from_status(status.as_u16()),
                format!("API error {}: {}", status, detail),
            ));
        }

        let parsed: Value = response.json().await.map_err(|e| {
            Error::generation(
                ProviderFailure::MalformedResponse,
                format!("Invalid response body: {}", e),
            )
        })?;
        extract_text(self.provider, &parsed).ok_or_else(|| {
            Error::generation(
                ProviderFailure::MalformedResponse,
                "Response contained no text",
            )
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
