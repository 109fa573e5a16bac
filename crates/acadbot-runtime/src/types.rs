//! Runtime types.

use serde::Serialize;

use acadbot_ingest::LoadFailure;
use acadbot_store::IndexManifest;

/// Lifecycle of the live index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// Nothing built or loaded yet.
    Unbuilt,
    /// Built in this process and persisted.
    Persisted,
    /// Loaded from a persisted index.
    Loaded,
}

/// Outcome of building (or reusing) the index for the corpus.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    #[serde(rename = "failedFiles")]
    pub failed_files: Vec<LoadFailure>,
    #[serde(rename = "modelId")]
    pub model_id: String,
    #[serde(rename = "corpusFingerprint")]
    pub corpus_fingerprint: String,
    /// True when the persisted index matched the corpus and was loaded instead.
    pub reused: bool,
}

/// Snapshot of the pipeline for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub state: IndexState,
    pub manifest: Option<IndexManifest>,
    #[serde(rename = "recordCount")]
    pub record_count: usize,
    #[serde(rename = "embeddingModel")]
    pub embedding_model: String,
    #[serde(rename = "generationModel")]
    pub generation_model: Option<String>,
}
