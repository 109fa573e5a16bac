//! Error types for AcadBot.

use serde::Serialize;
use thiserror::Error;

/// Why a call to an external provider failed.
///
/// Transient kinds are worth retrying with backoff; the rest need a
/// configuration or input change first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailure {
    Timeout,
    RateLimited,
    Unavailable,
    Unauthorized,
    InvalidRequest,
    MalformedResponse,
}

impl ProviderFailure {
    /// Classify an HTTP status returned by a provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Unavailable,
            _ => Self::InvalidRequest,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Unavailable)
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::MalformedResponse => write!(f, "malformed_response"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Load error ({path}): {message}")]
    Load { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error ({kind}): {message}")]
    Embedding {
        kind: ProviderFailure,
        message: String,
    },

    #[error("Index mismatch: index was built with {expected}, query uses {found}; rebuild the index")]
    IndexMismatch { expected: String, found: String },

    #[error("Generation error ({kind}): {message}")]
    Generation {
        kind: ProviderFailure,
        message: String,
    },

    #[error("Index has not been built")]
    IndexNotBuilt,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Duplicate content: hash={0}")]
    DuplicateContent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn load(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    pub fn embedding(kind: ProviderFailure, message: impl Into<String>) -> Self {
        Self::Embedding {
            kind,
            message: message.into(),
        }
    }

    pub fn generation(kind: ProviderFailure, message: impl Into<String>) -> Self {
        Self::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Provider failure kind, if this error came from a provider call.
    pub fn provider_failure(&self) -> Option<ProviderFailure> {
        match self {
            Self::Embedding { kind, .. } | Self::Generation { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether a caller may retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        self.provider_failure()
            .map(|k| k.is_transient())
            .unwrap_or(false)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
