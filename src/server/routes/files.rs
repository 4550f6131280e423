use crate::error::FerryError;
use crate::google::drive::{DriveFile, DriveFileList};
use crate::server::router::FerryState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    page_token: Option<String>,
    page_size: Option<u32>,
}

/// GET /api/files/list
pub async fn list(
    State(state): State<FerryState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DriveFileList>, FerryError> {
    let token = state.tokens.valid_token().await?;
    let listing = state
        .drive
        .list(&token, query.page_token.as_deref(), query.page_size)
        .await?;
    Ok(Json(listing))
}

/// GET /api/files/{file_id}/metadata
pub async fn metadata(
    State(state): State<FerryState>,
    Path(file_id): Path<String>,
) -> Result<Json<DriveFile>, FerryError> {
    let token = state.tokens.valid_token().await?;
    Ok(Json(state.drive.metadata(&token, &file_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

/// GET /api/files/search
pub async fn search(
    State(state): State<FerryState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<DriveFileList>, FerryError> {
    let token = state.tokens.valid_token().await?;
    let found = state
        .drive
        .search(&token, query.q.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(found))
}

/// DELETE /api/files/{file_id}
pub async fn delete(
    State(state): State<FerryState>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, FerryError> {
    let token = state.tokens.valid_token().await?;
    state.drive.delete(&token, &file_id).await?;
    Ok(Json(json!({ "success": true, "message": "File deleted" })))
}
