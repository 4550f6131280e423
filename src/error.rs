use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum FerryError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No refresh token available. Please configure REFRESH_TOKEN.")]
    RefreshTokenMissing,

    #[error(transparent)]
    Oauth(#[from] OauthError),

    #[error("Invalid Google Drive URL format")]
    InvalidShareUrl,

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Task not found")]
    TaskNotFound,

    #[error("Drive API error with status {status}: {body}")]
    DriveApi { status: StatusCode, body: String },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Malformed upstream payload: {0}")]
    BadUpstreamPayload(&'static str),

    #[error("HTTP request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Task queue closed")]
    QueueClosed,
}

impl FerryError {
    fn status(&self) -> StatusCode {
        match self {
            FerryError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            FerryError::InvalidShareUrl
            | FerryError::FileTooLarge { .. }
            | FerryError::MissingField(_) => StatusCode::BAD_REQUEST,
            FerryError::TaskNotFound => StatusCode::NOT_FOUND,
            FerryError::RefreshTokenMissing
            | FerryError::Oauth(_)
            | FerryError::DriveApi { .. }
            | FerryError::BadUpstreamPayload(_)
            | FerryError::Network(_)
            | FerryError::Json(_)
            | FerryError::Io(_)
            | FerryError::Url(_)
            | FerryError::QueueClosed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            FerryError::DriveApi { status, body } => Some(serde_json::json!({
                "status": status.as_u16(),
                "body": body,
            })),
            FerryError::FileTooLarge { size, limit } => Some(serde_json::json!({
                "size": size,
                "limit": limit,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for FerryError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorBody {
            details: self.details(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Flat JSON error payload returned by every route.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, ThisError)]
pub enum OauthError {
    #[error("OAuth2 request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OAuth2 server response error: {error}")]
    ServerResponse { error: String },

    #[error("OAuth2 token endpoint parse error: {message}. Body: {body}")]
    Parse { message: String, body: String },

    #[error("OAuth2 unexpected error: {message}")]
    Other { message: String },
}

type PkgsRequestTokenError = RequestTokenError<
    HttpClientError<ReqwestClientError>,
    StandardErrorResponse<BasicErrorResponseType>,
>;

impl From<PkgsRequestTokenError> for OauthError {
    fn from(e: PkgsRequestTokenError) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => OauthError::ServerResponse {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(wrapper) => match wrapper {
                oauth2::HttpClientError::Reqwest(real_err) => OauthError::Request(*real_err),
                other => OauthError::Other {
                    message: format!("HttpClientError: {:?}", other),
                },
            },
            RequestTokenError::Parse(parse_err, body) => OauthError::Parse {
                message: parse_err.to_string(),
                body: truncate_body(&String::from_utf8_lossy(&body)),
            },
            RequestTokenError::Other(s) => OauthError::Other { message: s },
        }
    }
}

impl From<PkgsRequestTokenError> for FerryError {
    fn from(e: PkgsRequestTokenError) -> Self {
        OauthError::from(e).into()
    }
}

/// Cap upstream bodies carried inside error values.
pub(crate) fn truncate_body(body: &str) -> String {
    body.char_indices()
        .nth(200)
        .map(|(idx, _)| format!("{}...<truncated>", &body[..idx]))
        .unwrap_or_else(|| body.to_string())
}
