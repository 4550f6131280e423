use crate::config::Config;
use crate::error::FerryError;
use crate::google::{drive::DriveClient, token::TokenCache};
use crate::server::guards::session::RequireSession;
use crate::server::routes::{auth, files, health, tasks, transfer};
use crate::tasks::registry::TaskRegistry;
use crate::tasks::worker::TaskQueue;
use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::Key;
use base64::Engine as _;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct FerryState {
    pub config: Arc<Config>,
    pub drive: DriveClient,
    pub tokens: Arc<TokenCache>,
    pub registry: Arc<TaskRegistry>,
    pub queue: TaskQueue,
    cookie_key: Key,
}

impl FerryState {
    /// Wire the shared HTTP client, token cache, Drive client, task registry
    /// and worker pool together. Must run inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self, FerryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("driveferry/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("FATAL: initialize shared HTTP client failed");

        let cookie_key = cookie_key_from(&config.secret_key);
        let tokens = Arc::new(TokenCache::new(&config, http.clone())?);
        let drive = DriveClient::new(http.clone(), config.chunk_size);
        let registry = Arc::new(TaskRegistry::new(Duration::from_secs(
            config.task_retention_secs,
        )));
        let queue = TaskQueue::spawn(
            registry.clone(),
            tokens.clone(),
            drive.clone(),
            http,
            config.worker_concurrency,
        );

        Ok(Self {
            config: Arc::new(config),
            drive,
            tokens,
            registry,
            queue,
            cookie_key,
        })
    }
}

impl FromRef<FerryState> for Key {
    fn from_ref(state: &FerryState) -> Self {
        state.cookie_key.clone()
    }
}

/// Derive the cookie key from `SECRET_KEY`, or mint a per-process one.
fn cookie_key_from(secret: &str) -> Key {
    if secret.len() >= 32 {
        Key::derive_from(secret.as_bytes())
    } else {
        if !secret.is_empty() {
            warn!("SECRET_KEY shorter than 32 bytes; using a random session key instead");
        }
        Key::generate()
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let start = Instant::now();
    let mut resp = next.run(req).await;

    // Reflect `x-request-id` for correlation even when the client sent none.
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {} | {}ms",
            status.as_u16(),
            request_id,
            method.as_str(),
            path,
            latency_ms
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {} | {}ms",
            status.as_u16(),
            request_id,
            method.as_str(),
            path,
            latency_ms
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {} | {}ms",
            status.as_u16(),
            request_id,
            method.as_str(),
            path,
            latency_ms
        );
    }

    resp
}

pub fn ferry_router(state: FerryState) -> Router {
    let open = Router::new()
        .route("/", get(health::index))
        .route("/api/health", get(health::health))
        .route("/api/login", post(auth::login))
        .route("/api/auth/check", get(auth::check));

    let gated = Router::new()
        .route("/api/logout", post(auth::logout))
        .route("/api/files/list", get(files::list))
        .route("/api/files/search", get(files::search))
        .route("/api/files/{file_id}/metadata", get(files::metadata))
        .route("/api/files/{file_id}", delete(files::delete))
        .route("/api/transfer", post(transfer::transfer))
        .route("/api/files/extract", post(tasks::extract))
        .route("/api/files/upload-from-url", post(tasks::upload_from_url))
        .route(
            "/api/files/progress/{task_id}",
            get(tasks::progress).delete(tasks::cancel),
        )
        .layer(middleware::from_extractor_with_state::<RequireSession, _>(
            state.clone(),
        ));

    Router::new()
        .merge(open)
        .merge(gated)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
