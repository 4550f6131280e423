use crate::error::FerryError;
use crate::server::guards::session::{SESSION_COOKIE, session_cookie};
use crate::server::router::FerryState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// POST /api/login
pub async fn login(
    State(state): State<FerryState>,
    jar: PrivateCookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, FerryError> {
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    let cfg = &state.config;
    let matches = username.as_bytes().ct_eq(cfg.auth_username.as_bytes())
        & password.as_bytes().ct_eq(cfg.auth_password.as_bytes());
    if !bool::from(matches) {
        warn!(user = %username, "login rejected");
        return Err(FerryError::InvalidCredentials);
    }

    info!(user = %username, "login accepted");
    let jar = jar.add(session_cookie(Utc::now().to_rfc3339()));
    Ok((
        jar,
        Json(json!({ "success": true, "user": { "username": username } })),
    ))
}

/// POST /api/logout
pub async fn logout(jar: PrivateCookieJar) -> impl IntoResponse {
    (
        jar.remove(Cookie::from(SESSION_COOKIE)),
        Json(json!({ "success": true })),
    )
}

/// GET /api/auth/check
pub async fn check(jar: PrivateCookieJar) -> impl IntoResponse {
    if jar.get(SESSION_COOKIE).is_some() {
        (StatusCode::OK, Json(json!({ "authenticated": true })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "authenticated": false })),
        )
    }
}
