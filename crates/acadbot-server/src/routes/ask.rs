//! Question answering and raw retrieval.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ask", post(ask))
        .route("/search", post(search))
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

/// POST /api/ask: answer from the indexed course material.
async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> ApiResult<axum::response::Response> {
    if !state.pipeline.has_generator() {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "No LLM provider configured" })),
        )
            .into_response());
    }

    let answer = state
        .pipeline
        .ask(&req.question, req.k, req.temperature)
        .await?;
    Ok(Json(answer).into_response())
}

/// POST /api/search: retrieval only, no generation.
async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = state.pipeline.retrieve(&req.query, req.k).await?;
    Ok(Json(serde_json::json!({
        "query": req.query,
        "total": result.len(),
        "results": result.hits,
    })))
}
