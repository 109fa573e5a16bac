//! Pipeline: corpus → chunks → embeddings → index → answers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{info, warn};

use crate::types::*;
use acadbot_chat::{Answer, AnswerGenerator, CompletionProvider};
use acadbot_core::config::validate_temperature;
use acadbot_core::{Error, RagSettings, Result};
use acadbot_infer::{BatchOptions, EmbeddingProvider};
use acadbot_ingest::{corpus_fingerprint, discover_pdfs, load_corpus, Chunker, LoadReport};
use acadbot_resolve::Retriever;
use acadbot_store::{
    BuildParams, IndexBuilder, IndexStore, RetrievalResult, SharedIndex, VectorIndex,
};

/// Owns the live index and every provider handle. No global state.
pub struct Pipeline {
    settings: RagSettings,
    corpus_dir: PathBuf,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    generator: Option<AnswerGenerator>,
    index: SharedIndex,
    store: IndexStore,
    state: Mutex<IndexState>,
    build_lock: AsyncMutex<()>,
    permits: Semaphore,
}

impl Pipeline {
    /// Validates settings before any provider is contacted.
    pub fn new(
        settings: RagSettings,
        corpus_dir: impl Into<PathBuf>,
        index_dir: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Result<Self> {
        settings.validate()?;
        let chunker = Chunker::new(settings.chunk_size, settings.chunk_overlap)?;
        let store = IndexStore::open(index_dir)?;
        let retriever = Retriever::new(embedder.clone(), settings.request_timeout());
        let generator = completion.map(|provider| {
            AnswerGenerator::new(provider).with_max_tokens(settings.max_answer_tokens)
        });

        info!(
            "Pipeline ready: embedder={}, generator={}, chunk_size={}, overlap={}, k={}",
            embedder.model_id(),
            generator.as_ref().map(|g| g.model()).unwrap_or("none"),
            settings.chunk_size,
            settings.chunk_overlap,
            settings.top_k
        );

        Ok(Self {
            permits: Semaphore::new(settings.max_concurrency),
            settings,
            corpus_dir: corpus_dir.into(),
            chunker,
            embedder,
            retriever,
            generator,
            index: SharedIndex::new(),
            store,
            state: Mutex::new(IndexState::Unbuilt),
            build_lock: AsyncMutex::new(()),
        })
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    // ---------------------------------------------------------------
    // Index lifecycle
    // ---------------------------------------------------------------

    /// Rebuild from the corpus directory, persist, then swap in.
    pub async fn build_from_corpus(&self) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        self.rebuild_locked().await
    }

    /// Install the persisted index as-is.
    pub async fn load_persisted(&self) -> Result<()> {
        let _guard = self.build_lock.lock().await;
        let index = self.load_from_store().await?;
        self.install(index, IndexState::Loaded);
        Ok(())
    }

    /// Load the persisted index when it was built from this corpus with the
    /// current model and chunking; rebuild otherwise.
    pub async fn load_or_build(&self) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;

        let corpus = self.corpus_dir.clone();
        let fingerprint =
            run_blocking(move || Ok(corpus_fingerprint(&discover_pdfs(&corpus)?))).await?;

        let store = self.store.clone();
        let manifest = run_blocking(move || store.load_manifest()).await?;
        let reusable = manifest.is_some_and(|m| {
            m.matches(
                self.embedder.model_id(),
                self.embedder.dimension(),
                self.settings.chunk_size,
                self.settings.chunk_overlap,
                &fingerprint,
            )
        });
        if !reusable {
            info!("Persisted index is missing or stale; rebuilding");
            return self.rebuild_locked().await;
        }

        let index = self.load_from_store().await?;
        let sources: BTreeSet<&str> = index
            .records()
            .iter()
            .map(|r| r.chunk.source.as_str())
            .collect();
        let report = BuildReport {
            documents: sources.len(),
            chunks: index.len(),
            failed_files: Vec::new(),
            model_id: index.manifest().model_id.clone(),
            corpus_fingerprint: fingerprint,
            reused: true,
        };
        self.install(index, IndexState::Loaded);
        Ok(report)
    }

    async fn rebuild_locked(&self) -> Result<BuildReport> {
        let corpus = self.corpus_dir.clone();
        let (fingerprint, loaded): (String, LoadReport) = run_blocking(move || {
            let fingerprint = corpus_fingerprint(&discover_pdfs(&corpus)?);
            Ok((fingerprint, load_corpus(&corpus)?))
        })
        .await?;

        let chunks = self.chunker.chunk_all(&loaded.documents);
        let chunk_count = chunks.len();
        info!(
            "Chunked {} documents into {} chunks",
            loaded.documents.len(),
            chunk_count
        );

        let builder = IndexBuilder::new(
            self.embedder.clone(),
            BatchOptions {
                batch_size: self.settings.embed_batch_size,
                max_concurrency: self.settings.max_concurrency,
                timeout: self.settings.request_timeout(),
            },
        );
        let index = builder
            .build(
                chunks,
                BuildParams {
                    chunk_size: self.settings.chunk_size,
                    chunk_overlap: self.settings.chunk_overlap,
                    corpus_fingerprint: fingerprint.clone(),
                },
            )
            .await?;

        let store = self.store.clone();
        let index = run_blocking(move || store.persist(&index).map(|_| index)).await?;

        let report = BuildReport {
            documents: loaded.documents.len(),
            chunks: chunk_count,
            failed_files: loaded.failures,
            model_id: index.manifest().model_id.clone(),
            corpus_fingerprint: fingerprint,
            reused: false,
        };
        self.install(index, IndexState::Persisted);
        Ok(report)
    }

    async fn load_from_store(&self) -> Result<VectorIndex> {
        let store = self.store.clone();
        run_blocking(move || store.load()).await
    }

    fn install(&self, index: VectorIndex, state: IndexState) {
        let records = index.len();
        self.index.swap(index);
        *self.state.lock() = state;
        info!("Index swapped in: {} records ({:?})", records, state);
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Top-k chunks for a question against the live index.
    pub async fn retrieve(&self, question: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let index = self.index.get().ok_or(Error::IndexNotBuilt)?;
        let k = k.unwrap_or(self.settings.top_k);
        self.retriever.retrieve(&index, question, k).await
    }

    /// Retrieve, then generate an answer grounded in the retrieved chunks.
    pub async fn ask(
        &self,
        question: &str,
        k: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<Answer> {
        let temperature = temperature.unwrap_or(self.settings.temperature);
        validate_temperature(temperature)?;
        let generator = self.generator.as_ref().ok_or_else(|| {
            Error::Config(
                "No LLM provider configured. Set an API key in llm-config.json or the environment."
                    .into(),
            )
        })?;

        let retrieval = self.retrieve(question, k).await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        generator
            .generate(question, &retrieval, temperature)
            .await
            .map_err(|e| {
                warn!("Unable to answer: {}", e);
                e
            })
    }

    pub fn status(&self) -> PipelineStatus {
        let index = self.index.get();
        PipelineStatus {
            state: *self.state.lock(),
            record_count: index.as_ref().map(|i| i.len()).unwrap_or(0),
            manifest: index.map(|i| i.manifest().clone()),
            embedding_model: self.embedder.model_id().to_string(),
            generation_model: self.generator.as_ref().map(|g| g.model().to_string()),
        }
    }
}

/// Run filesystem/SQLite work off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}
