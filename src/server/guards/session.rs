use crate::server::router::FerryState;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde_json::json;

pub const SESSION_COOKIE: &str = "ferry_session";

/// Extractor guarding the authenticated API surface. Presence of the
/// encrypted session cookie is the whole check; its value is the login
/// timestamp set by the login handler.
#[derive(Debug, Clone, Copy)]
pub struct RequireSession;

impl FromRequestParts<FerryState> for RequireSession {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &FerryState,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar = PrivateCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| SessionRejection)?;
        match jar.get(SESSION_COOKIE) {
            Some(_) => Ok(RequireSession),
            None => Err(SessionRejection),
        }
    }
}

pub struct SessionRejection;

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
    }
}

/// Session cookie scoped to the whole app; lives until the browser drops it.
pub fn session_cookie(login_time: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, login_time))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
