use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    let cfg = driveferry::config::Config::default();
    let state = driveferry::FerryState::new(cfg).expect("failed to build state");
    driveferry::ferry_router(state)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

async fn login(app: &Router) -> String {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"username":"admin","password":"secure123"}"#,
                ))
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.headers()
        .get(header::SET_COOKIE)
        .expect("login set no session cookie")
        .to_str()
        .expect("cookie is not ascii")
        .split(';')
        .next()
        .expect("empty cookie")
        .to_string()
}

async fn post_json(app: &Router, cookie: &str, uri: &str, body: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header(header::COOKIE, cookie)
                .body(Body::from(body.to_string()))
                .expect("failed to build request"),
        )
        .await
        .expect("request failed")
}

async fn get(app: &Router, cookie: &str, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed")
}

#[tokio::test]
async fn transfer_requires_a_drive_url() {
    let app = app();
    let cookie = login(&app).await;

    let resp = post_json(&app, &cookie, "/api/transfer", "{}").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Drive URL is required");
}

#[tokio::test]
async fn transfer_rejects_malformed_share_urls() {
    let app = app();
    let cookie = login(&app).await;

    let resp = post_json(
        &app,
        &cookie,
        "/api/transfer",
        r#"{"driveUrl":"https://example.com/some/file.bin"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "Invalid Google Drive URL format"
    );
}

#[tokio::test]
async fn extract_requires_a_file_id() {
    let app = app();
    let cookie = login(&app).await;

    let resp = post_json(&app, &cookie, "/api/files/extract", "{}").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "File ID is required");
}

#[tokio::test]
async fn upload_from_url_requires_a_download_url() {
    let app = app();
    let cookie = login(&app).await;

    let resp = post_json(&app, &cookie, "/api/files/upload-from-url", "{}").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Download URL is required");
}

#[tokio::test]
async fn progress_of_an_unknown_task_is_404() {
    let app = app();
    let cookie = login(&app).await;

    let resp = get(&app, &cookie, "/api/files/progress/no-such-task").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "Task not found");
}

#[tokio::test]
async fn cancel_of_an_unknown_task_is_404() {
    let app = app();
    let cookie = login(&app).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/files/progress/no-such-task")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn extract_registers_a_pollable_task() {
    let app = app();
    let cookie = login(&app).await;

    let resp = post_json(
        &app,
        &cookie,
        "/api/files/extract",
        r#"{"fileId":"abc123","taskId":"extract-test-1"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["taskId"], "extract-test-1");

    let resp = get(&app, &cookie, "/api/files/progress/extract-test-1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let record = body_json(resp).await;
    assert_eq!(record["fileId"], "abc123");

    // No refresh token is configured, so the worker fails fast without
    // touching the network; the failure must land in the record, not crash.
    for _ in 0..250 {
        let record = body_json(get(&app, &cookie, "/api/files/progress/extract-test-1").await).await;
        if record["status"] == "failed" {
            let error = record["error"].as_str().expect("failed without error text");
            assert!(error.contains("refresh token"), "unexpected error: {error}");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("extract task never reached a terminal state");
}

#[tokio::test]
async fn upload_from_url_mints_upload_task_ids() {
    let app = app();
    let cookie = login(&app).await;

    let resp = post_json(
        &app,
        &cookie,
        "/api/files/upload-from-url",
        r#"{"downloadUrl":"http://127.0.0.1:9/unreachable.bin"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Upload started");
    let task_id = body["taskId"].as_str().expect("missing taskId");
    assert!(task_id.starts_with("upload-"));

    let resp = get(&app, &cookie, &format!("/api/files/progress/{task_id}")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
