//! Chat and answer types.

use serde::{Deserialize, Serialize};

use acadbot_store::RetrievalHit;

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Groq => write!(f, "groq"),
        }
    }
}

/// One message of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// A chunk cited by an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Context block number shown to the model, 1-based.
    pub index: usize,
    pub chunk_id: String,
    pub source: String,
    pub page: usize,
    pub score: f32,
    pub text: String,
}

impl From<&RetrievalHit> for SourceRef {
    fn from(hit: &RetrievalHit) -> Self {
        Self {
            index: hit.rank,
            chunk_id: hit.chunk.id.clone(),
            source: hit.chunk.source.clone(),
            page: hit.chunk.page,
            score: hit.score,
            text: hit.chunk.text.clone(),
        }
    }
}

/// Generated answer plus provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Model that produced the answer; `None` when no model was called.
    pub model: Option<String>,
}

/// LLM config response (keys masked).
#[derive(Debug, Clone, Serialize)]
pub struct LLMConfigResponse {
    #[serde(rename = "preferredProvider")]
    pub preferred_provider: String,
    #[serde(rename = "openaiConfigured")]
    pub openai_configured: bool,
    #[serde(rename = "anthropicConfigured")]
    pub anthropic_configured: bool,
    #[serde(rename = "groqConfigured")]
    pub groq_configured: bool,
    #[serde(rename = "openaiModel")]
    pub openai_model: String,
    #[serde(rename = "anthropicModel")]
    pub anthropic_model: String,
    #[serde(rename = "groqModel")]
    pub groq_model: String,
    #[serde(rename = "embeddingModel")]
    pub embedding_model: String,
    #[serde(rename = "activeProvider")]
    pub active_provider: Option<String>,
}
