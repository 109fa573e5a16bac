//! LLM configuration and provider selection.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{LLMConfigResponse, LLMProvider};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Stored LLM configuration (`llm-config.json`).
#[derive(Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// `auto`, `openai`, `anthropic` or `groq`.
    #[serde(default = "default_preferred")]
    pub preferred_provider: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    /// OpenAI embedding model; used whenever an OpenAI key is present.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_preferred() -> String {
    "auto".into()
}
fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.into()
}
fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.into()
}
fn default_groq_model() -> String {
    DEFAULT_GROQ_MODEL.into()
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.into()
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: default_preferred(),
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            groq_model: default_groq_model(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "[redacted]");
        f.debug_struct("LLMConfig")
            .field("preferred_provider", &self.preferred_provider)
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("groq_api_key", &mask(&self.groq_api_key))
            .field("openai_model", &self.openai_model)
            .field("anthropic_model", &self.anthropic_model)
            .field("groq_model", &self.groq_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

fn non_empty(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.trim().is_empty())
}

impl LLMConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    /// Like [`LLMConfig::load`] with an explicit variable lookup.
    pub fn load_with(config_path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config: LLMConfig = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring invalid {}: {}", config_path.display(), e);
                LLMConfig::default()
            }),
            Err(_) => LLMConfig::default(),
        };

        // Env vars as fallback for API keys
        config.openai_api_key =
            non_empty(config.openai_api_key.take()).or_else(|| non_empty(lookup("OPENAI_API_KEY")));
        config.anthropic_api_key = non_empty(config.anthropic_api_key.take())
            .or_else(|| non_empty(lookup("ANTHROPIC_API_KEY")));
        config.groq_api_key =
            non_empty(config.groq_api_key.take()).or_else(|| non_empty(lookup("GROQ_API_KEY")));

        config
    }

    /// Resolve which provider and model to use: (provider, model, api key).
    pub fn resolve_provider(&self) -> Option<(LLMProvider, String, String)> {
        // Explicit preference
        if self.preferred_provider != "auto" {
            return match self.preferred_provider.as_str() {
                "openai" => self
                    .openai_api_key
                    .as_ref()
                    .map(|k| (LLMProvider::OpenAI, self.openai_model.clone(), k.clone())),
                "anthropic" => self
                    .anthropic_api_key
                    .as_ref()
                    .map(|k| (LLMProvider::Anthropic, self.anthropic_model.clone(), k.clone())),
                "groq" => self
                    .groq_api_key
                    .as_ref()
                    .map(|k| (LLMProvider::Groq, self.groq_model.clone(), k.clone())),
                _ => None,
            };
        }

        // Auto mode: Anthropic > Groq > OpenAI
        if let Some(k) = &self.anthropic_api_key {
            return Some((LLMProvider::Anthropic, self.anthropic_model.clone(), k.clone()));
        }
        if let Some(k) = &self.groq_api_key {
            return Some((LLMProvider::Groq, self.groq_model.clone(), k.clone()));
        }
        if let Some(k) = &self.openai_api_key {
            return Some((LLMProvider::OpenAI, self.openai_model.clone(), k.clone()));
        }

        None
    }

    /// Build the public config response (no API keys exposed).
    pub fn to_response(&self) -> LLMConfigResponse {
        let resolved = self.resolve_provider();
        LLMConfigResponse {
            preferred_provider: self.preferred_provider.clone(),
            openai_configured: self.openai_api_key.is_some(),
            anthropic_configured: self.anthropic_api_key.is_some(),
            groq_configured: self.groq_api_key.is_some(),
            openai_model: self.openai_model.clone(),
            anthropic_model: self.anthropic_model.clone(),
            groq_model: self.groq_model.clone(),
            embedding_model: self.embedding_model.clone(),
            active_provider: resolved.map(|(p, _, _)| p.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = LLMConfig::load_with(&dir.path().join("llm-config.json"), no_env);
        assert_eq!(config.preferred_provider, "auto");
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert!(config.resolve_provider().is_none());
    }

    #[test]
    fn test_auto_order_and_env_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("llm-config.json");
        std::fs::write(&path, r#"{"openai_api_key": "sk-file"}"#).unwrap();

        let config = LLMConfig::load_with(&path, |k| {
            (k == "GROQ_API_KEY").then(|| "gsk-env".to_string())
        });
        let (provider, model, key) = config.resolve_provider().unwrap();
        assert_eq!(provider, LLMProvider::Groq);
        assert_eq!(model, DEFAULT_GROQ_MODEL);
        assert_eq!(key, "gsk-env");
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn test_explicit_preference_without_key() {
        let config = LLMConfig {
            preferred_provider: "anthropic".into(),
            openai_api_key: Some("sk".into()),
            ..Default::default()
        };
        assert!(config.resolve_provider().is_none());
    }

    #[test]
    fn test_keys_never_printed() {
        let config = LLMConfig {
            openai_api_key: Some("sk-very-secret".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("sk-very-secret"));
        let public = serde_json::to_string(&config.to_response()).unwrap();
        assert!(!public.contains("sk-very-secret"));
        assert!(public.contains("\"openaiConfigured\":true"));
    }
}
