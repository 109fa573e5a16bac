//! Course document management: list, fetch, upload (multipart), delete.
//!
//! Every change to the corpus rebuilds the index. Uploaded files are only
//! registered once the rebuild that includes them has succeeded.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::state::AppState;
use acadbot_core::Error;
use acadbot_ingest::batch::file_key;
use acadbot_ingest::registry::MAX_UPLOAD_BYTES;
use acadbot_ingest::{BatchState, DocumentRecord, FileStatus};

/// Whole multipart body; individual files are still capped at 50 MiB.
const UPLOAD_BODY_LIMIT: usize = 4 * MAX_UPLOAD_BYTES;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents", get(list_documents))
        .route(
            "/documents/upload",
            post(upload_documents).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/documents/{file_id}", get(get_document).delete(delete_document))
}

/// GET /api/documents: registered documents, newest first.
async fn list_documents(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let documents = state.registry.list()?;
    Ok(Json(serde_json::json!({
        "total": documents.len(),
        "documents": documents,
    })))
}

/// GET /api/documents/{file_id}: one registered document.
async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<DocumentRecord>> {
    let record = state
        .registry
        .get(&file_id)?
        .ok_or_else(|| Error::NotFound(format!("document {}", file_id)))?;
    Ok(Json(record))
}

/// POST /api/documents/upload: stage files, rebuild, report per-file status.
async fn upload_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut seen = HashSet::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Malformed upload: {}", e)))?
    {
        let Some(name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Read failed for {}: {}", name, e)))?;
        if !seen.insert(file_key(&name, bytes.len() as u64)) {
            debug!("Skipping repeated file {} in upload", name);
            continue;
        }
        files.push((name, bytes.to_vec()));
    }
    if files.is_empty() {
        return Err(Error::InvalidRequest("No files in upload".into()).into());
    }

    let signatures: Vec<(String, u64)> = files
        .iter()
        .map(|(name, bytes)| (name.clone(), bytes.len() as u64))
        .collect();
    let mut batch = BatchState::new(&signatures);
    info!("Upload batch {}: {} files", batch.batch_id, batch.total());

    let mut staged: Vec<(String, DocumentRecord)> = Vec::new();
    for (name, bytes) in &files {
        let key = file_key(name, bytes.len() as u64);
        batch.update(&key, FileStatus::Processing, None);
        match state.registry.stage_upload(name, bytes) {
            Ok(record) => {
                batch.set_file_id(&key, record.file_id.clone());
                staged.push((key, record));
            }
            Err(e) => {
                warn!("Rejected upload {}: {}", name, e);
                batch.update(&key, FileStatus::Failed, Some(e.to_string()));
            }
        }
    }

    let mut index = None;
    if !staged.is_empty() {
        match state.pipeline.build_from_corpus().await {
            Ok(report) => {
                for (key, record) in &staged {
                    let unreadable = report
                        .failed_files
                        .iter()
                        .find(|f| f.path == record.filepath);
                    let outcome = match unreadable {
                        Some(failure) => {
                            discard(&state, record);
                            Err(Error::load(&failure.path, failure.error.clone()))
                        }
                        None => state.registry.save_record(record),
                    };
                    match outcome {
                        Ok(()) => batch.update(key, FileStatus::Success, None),
                        Err(e) => batch.update(key, FileStatus::Failed, Some(e.to_string())),
                    };
                }
                index = Some(report);
            }
            Err(e) => {
                warn!("Index rebuild after upload failed: {}", e);
                for (key, record) in &staged {
                    discard(&state, record);
                    batch.update(key, FileStatus::Failed, Some(e.to_string()));
                }
            }
        }
    }

    info!("Upload batch {}: {}", batch.batch_id, batch.summary());
    let failed = batch.failed_keys();
    if !failed.is_empty() {
        warn!("Upload batch {}: failed {:?}", batch.batch_id, failed);
    }
    Ok(Json(serde_json::json!({
        "batchId": batch.batch_id,
        "status": batch.overall_status(),
        "progress": batch.progress(),
        "summary": batch.summary(),
        "files": batch.files,
        "index": index,
    })))
}

/// Take a staged file back out of the corpus.
fn discard(state: &AppState, record: &DocumentRecord) {
    if let Err(e) = state.registry.discard_staged(record) {
        warn!("Could not remove staged upload {}: {}", record.file_id, e);
    }
}

/// DELETE /api/documents/{file_id}: rebuild without the file, then unregister it.
///
/// If the rebuild fails the file goes back into the corpus and stays registered,
/// matching the index that is still live.
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let parked = state.registry.park(&file_id)?;
    let report = match state.pipeline.build_from_corpus().await {
        Ok(report) => report,
        Err(e) => {
            warn!("Index rebuild after deleting {} failed: {}", file_id, e);
            if let Err(restore) = state.registry.unpark(&parked) {
                warn!("Could not restore {}: {}", file_id, restore);
            }
            return Err(e.into());
        }
    };
    let record = state.registry.delete(&file_id)?;
    Ok(Json(serde_json::json!({
        "deleted": record,
        "index": report,
    })))
}
