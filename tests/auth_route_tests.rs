use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
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

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = app();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"username":"admin","password":"wrong"}"#))
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn login_establishes_a_session() {
    let app = app();

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
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("missing session cookie")
        .to_str()
        .expect("cookie is not ascii")
        .split(';')
        .next()
        .expect("empty cookie")
        .to_string();
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "admin");

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/check")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["authenticated"], true);
}

#[tokio::test]
async fn check_without_a_session_is_unauthorized() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/api/auth/check")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["authenticated"], false);
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let app = app();
    let cookie = login(&app).await;

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");

    assert_eq!(resp.status(), StatusCode::OK);
    let removal = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("logout set no removal cookie")
        .to_str()
        .expect("cookie is not ascii")
        .to_string();
    assert!(removal.starts_with("ferry_session="));
    assert_eq!(body_json(resp).await["success"], true);
}

#[tokio::test]
async fn gated_routes_require_a_session() {
    let app = app();
    let requests = [
        ("GET", "/api/files/list"),
        ("GET", "/api/files/search?q=report"),
        ("POST", "/api/transfer"),
        ("POST", "/api/files/extract"),
        ("POST", "/api/files/upload-from-url"),
        ("GET", "/api/files/progress/some-task"),
        ("DELETE", "/api/files/progress/some-task"),
        ("DELETE", "/api/files/abc123"),
        ("POST", "/api/logout"),
    ];

    for (method, uri) in requests {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .expect("failed to build request"),
            )
            .await
            .expect("request failed");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body_json(resp).await["error"], "Unauthorized", "{method} {uri}");
    }
}

#[tokio::test]
async fn health_and_index_are_open() {
    let app = app();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["endpoints"].is_array());
}

#[tokio::test]
async fn unknown_routes_fall_back_to_404() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
