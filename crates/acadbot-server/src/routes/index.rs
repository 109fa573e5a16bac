//! Index status, rebuild and configuration views.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::state::AppState;
use acadbot_runtime::{BuildReport, PipelineStatus};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/index/status", get(get_status))
        .route("/index/rebuild", post(rebuild))
        .route("/config", get(get_config))
}

/// GET /api/index/status
async fn get_status(State(state): State<Arc<AppState>>) -> Json<PipelineStatus> {
    Json(state.pipeline.status())
}

/// POST /api/index/rebuild: rebuild from the corpus directory.
async fn rebuild(State(state): State<Arc<AppState>>) -> ApiResult<Json<BuildReport>> {
    let report = state.pipeline.build_from_corpus().await?;
    Ok(Json(report))
}

/// GET /api/config: active settings; credentials are never included.
async fn get_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "rag": state.config.rag,
        "llm": state.llm_config.to_response(),
        "corpusDir": state.config.data_paths.corpus,
    }))
}
