//! Retrieval request types.

use serde::Deserialize;

/// A search request over the live index.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveQuery {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

/// Reject blank questions and `k == 0` before any provider call.
pub fn validate_query(question: &str, k: usize) -> acadbot_core::Result<()> {
    if question.trim().is_empty() {
        return Err(acadbot_core::Error::InvalidRequest(
            "question must not be empty".into(),
        ));
    }
    if k == 0 {
        return Err(acadbot_core::Error::InvalidRequest(
            "k must be greater than zero".into(),
        ));
    }
    Ok(())
}
