//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Default chunk size in token units.
pub const DEFAULT_CHUNK_SIZE: usize = 300;
/// Default overlap between adjacent chunks in token units.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Paths to all AcadBot data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Course PDFs (`data/corpus/`).
    pub corpus: PathBuf,
    /// Persisted index (`data/index/`).
    pub index: PathBuf,
    /// Staging area for multipart uploads (`data/uploads/`).
    pub uploads: PathBuf,
    /// Pipeline settings (`data/settings.json`).
    pub settings_file: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::with_corpus(root.as_ref(), None)
    }

    /// Like [`DataPaths::new`] but with the corpus outside the data root.
    pub fn with_corpus(root: &Path, corpus: Option<PathBuf>) -> std::io::Result<Self> {
        let root = root.to_path_buf();
        let paths = Self {
            corpus: corpus.unwrap_or_else(|| root.join("corpus")),
            index: root.join("index"),
            uploads: root.join("uploads"),
            settings_file: root.join("settings.json"),
            llm_config_file: root.join("llm-config.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// Create all required directories.
    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.corpus)?;
        std::fs::create_dir_all(&self.index)?;
        std::fs::create_dir_all(&self.uploads)?;
        Ok(())
    }
}

/// Tunables of the retrieval/generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub temperature: f32,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    /// Provider calls allowed in flight at once.
    pub max_concurrency: usize,
    pub request_timeout_secs: u64,
    pub max_answer_tokens: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            temperature: 0.0,
            embed_batch_size: 64,
            max_concurrency: 4,
            request_timeout_secs: 30,
            max_answer_tokens: 1024,
        }
    }
}

impl RagSettings {
    /// Check parameter consistency. Runs before any provider is contacted.
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be greater than zero".into()));
        }
        validate_temperature(self.temperature)?;
        if self.embed_batch_size == 0 {
            return Err(Error::Config("embed_batch_size must be greater than zero".into()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be greater than zero".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply `ACADBOT_*` overrides from the given variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(name: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", name, raw)))
        }

        if let Some(v) = lookup("ACADBOT_CHUNK_SIZE") {
            self.chunk_size = parse("ACADBOT_CHUNK_SIZE", v)?;
        }
        if let Some(v) = lookup("ACADBOT_CHUNK_OVERLAP") {
            self.chunk_overlap = parse("ACADBOT_CHUNK_OVERLAP", v)?;
        }
        if let Some(v) = lookup("ACADBOT_TOP_K") {
            self.top_k = parse("ACADBOT_TOP_K", v)?;
        }
        if let Some(v) = lookup("ACADBOT_TEMPERATURE") {
            self.temperature = parse("ACADBOT_TEMPERATURE", v)?;
        }
        if let Some(v) = lookup("ACADBOT_EMBED_BATCH_SIZE") {
            self.embed_batch_size = parse("ACADBOT_EMBED_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("ACADBOT_MAX_CONCURRENCY") {
            self.max_concurrency = parse("ACADBOT_MAX_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("ACADBOT_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse("ACADBOT_REQUEST_TIMEOUT_SECS", v)?;
        }
        Ok(())
    }
}

/// `chunk_overlap` must be strictly less than a non-zero `chunk_size`.
pub fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::Config("chunk_size must be greater than zero".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(Error::Config(format!(
            "chunk_overlap ({}) must be less than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

pub fn validate_temperature(temperature: f32) -> Result<()> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(Error::Config(format!(
            "temperature must be within [0, 2], got {}",
            temperature
        )));
    }
    Ok(())
}

/// Top-level AcadBot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcadbotConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub rag: RagSettings,
}

impl AcadbotConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(data_dir.as_ref(), |name| std::env::var(name).ok())
    }

    /// Defaults, then `settings.json`, then variable overrides, then validation.
    pub fn load(data_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3003);

        let corpus = lookup("ACADBOT_CORPUS_DIR").map(PathBuf::from);
        let data_paths = DataPaths::with_corpus(data_dir, corpus)?;

        let mut rag: RagSettings = match std::fs::read_to_string(&data_paths.settings_file) {
            Ok(s) => {
                debug!("Reading {}", data_paths.settings_file.display());
                serde_json::from_str(&s).map_err(|e| {
                    Error::Config(format!(
                        "{} is not valid: {}",
                        data_paths.settings_file.display(),
                        e
                    ))
                })?
            }
            Err(_) => RagSettings::default(),
        };
        rag.apply_overrides(&lookup)?;
        rag.validate()?;

        Ok(Self {
            port,
            data_paths,
            rag,
        })
    }
}
