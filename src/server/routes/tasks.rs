use crate::error::FerryError;
use crate::server::router::FerryState;
use crate::tasks::registry::TaskRecord;
use crate::tasks::worker::TaskJob;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    file_id: Option<String>,
    task_id: Option<String>,
}

/// POST /api/files/extract
pub async fn extract(
    State(state): State<FerryState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<Value>, FerryError> {
    let file_id = req
        .file_id
        .filter(|id| !id.is_empty())
        .ok_or(FerryError::MissingField("File ID"))?;
    let task_id = req
        .task_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("extract-{}", Uuid::new_v4()));

    state
        .registry
        .register(&task_id, "Preparing...", Some(file_id.clone()));
    state.queue.submit(TaskJob::Extract {
        task_id: task_id.clone(),
        file_id,
    })?;

    Ok(Json(json!({ "success": true, "taskId": task_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFromUrlRequest {
    download_url: Option<String>,
    file_name: Option<String>,
}

/// POST /api/files/upload-from-url
pub async fn upload_from_url(
    State(state): State<FerryState>,
    Json(req): Json<UploadFromUrlRequest>,
) -> Result<Json<Value>, FerryError> {
    let download_url = req
        .download_url
        .filter(|url| !url.is_empty())
        .ok_or(FerryError::MissingField("Download URL"))?;
    let task_id = format!("upload-{}", Uuid::new_v4());

    state.registry.register(&task_id, "Downloading...", None);
    state.queue.submit(TaskJob::UploadFromUrl {
        task_id: task_id.clone(),
        download_url,
        file_name: req.file_name.filter(|name| !name.is_empty()),
    })?;

    Ok(Json(json!({
        "success": true,
        "taskId": task_id,
        "message": "Upload started",
    })))
}

/// GET /api/files/progress/{task_id}
pub async fn progress(
    State(state): State<FerryState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, FerryError> {
    state
        .registry
        .get(&task_id)
        .map(Json)
        .ok_or(FerryError::TaskNotFound)
}

/// DELETE /api/files/progress/{task_id}
pub async fn cancel(
    State(state): State<FerryState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, FerryError> {
    match state.registry.cancel(&task_id) {
        None => Err(FerryError::TaskNotFound),
        Some(_) => Ok(Json(json!({ "success": true }))),
    }
}
