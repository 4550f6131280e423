use crate::error::FerryError;
use crate::server::router::FerryState;
use crate::share_url::extract_file_id;
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    drive_url: Option<String>,
    file_name: Option<String>,
}

/// POST /api/transfer
///
/// Copies a shared file into the service's Drive entirely server-side;
/// no file bytes pass through this process.
pub async fn transfer(
    State(state): State<FerryState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Value>, FerryError> {
    let started = Instant::now();

    let drive_url = req
        .drive_url
        .filter(|url| !url.is_empty())
        .ok_or(FerryError::MissingField("Drive URL"))?;
    let file_id = extract_file_id(&drive_url)?;

    let token = state.tokens.valid_token().await?;
    let meta = state.drive.metadata(&token, &file_id).await?;

    let size = meta.size_bytes();
    let limit = state.config.max_file_size;
    if size > limit {
        return Err(FerryError::FileTooLarge { size, limit });
    }

    let file_name = req
        .file_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| meta.name.clone());
    let copied = state.drive.copy(&token, &file_id, &file_name).await?;
    let copy_id = copied
        .get("id")
        .and_then(Value::as_str)
        .ok_or(FerryError::BadUpstreamPayload("copy response missing file id"))?
        .to_string();

    info!(source = %file_id, copy = %copy_id, file = %file_name, "transfer completed");
    Ok(Json(json!({
        "success": true,
        "fileName": file_name,
        "fileId": copy_id,
        "fileSize": format_size_mb(size),
        "transferTime": format!("{:.1}s", started.elapsed().as_secs_f64()),
        "mimeType": meta.mime_type,
    })))
}

fn format_size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
