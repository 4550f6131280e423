use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /
pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "Google Drive Transfer Pro API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/api/login",
            "/api/logout",
            "/api/files/list",
            "/api/transfer",
            "/api/files/extract",
            "/api/files/upload-from-url",
        ],
    }))
}
