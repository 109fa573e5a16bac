//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use acadbot_chat::{CompletionProvider, HttpCompletionProvider, LLMConfig};
use acadbot_core::{AcadbotConfig, Result};
use acadbot_infer::{create_embedder, EmbeddingProvider};
use acadbot_ingest::DocumentRegistry;
use acadbot_runtime::Pipeline;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: AcadbotConfig,
    pub pipeline: Pipeline,
    pub registry: DocumentRegistry,
    pub llm_config: LLMConfig,
}

impl AppState {
    /// Wire providers from `llm-config.json` and the environment.
    pub fn from_config(config: AcadbotConfig) -> Result<Self> {
        let llm_config = LLMConfig::load(&config.data_paths.llm_config_file);
        let timeout = config.rag.request_timeout();

        let embedder = create_embedder(
            llm_config.openai_api_key.as_deref(),
            Some(&llm_config.embedding_model),
            timeout,
        )?;
        let completion = completion_provider(&llm_config, timeout)?;
        Self::with_providers(config, llm_config, embedder, completion)
    }

    /// State around explicit providers.
    pub fn with_providers(
        config: AcadbotConfig,
        llm_config: LLMConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Result<Self> {
        let paths = &config.data_paths;
        let pipeline = Pipeline::new(
            config.rag.clone(),
            &paths.corpus,
            &paths.index,
            embedder,
            completion,
        )?;
        let registry = DocumentRegistry::new(&paths.corpus, &paths.uploads)?;
        Ok(Self {
            config,
            pipeline,
            registry,
            llm_config,
        })
    }
}

fn completion_provider(
    llm_config: &LLMConfig,
    timeout: Duration,
) -> Result<Option<Arc<dyn CompletionProvider>>> {
    let provider = HttpCompletionProvider::from_config(llm_config, timeout)?;
    match provider {
        Some(p) => {
            tracing::info!("Using {} for generation (model={})", p.provider(), p.model());
            Ok(Some(Arc::new(p)))
        }
        None => {
            tracing::warn!("No LLM API key configured; /api/ask is unavailable");
            Ok(None)
        }
    }
}
