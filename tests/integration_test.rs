//! Integration tests for the proxy API
//!
//! These tests verify the entire application stack including:
//! - HTTP routing
//! - Token decoding, fetching and rewriting
//! - Mapping deduplication and access counting
//! - Error handling

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use tower::ServiceExt;

use linkproxy::codec::TokenCodec;
use linkproxy::config::Config;
use linkproxy::database::{init_db, MappingStore};
use linkproxy::pipeline::Pipeline;
use linkproxy::route::{create_app, AppState};

const SECRET: &str = "integration-secret";

/// Helper function to create a test application with a temporary database
fn setup_test_app() -> (axum::Router, MappingStore, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db = init_db(temp_db.path().to_str().unwrap()).expect("Failed to initialize test database");
    let store = MappingStore::new(Arc::new(db));

    let config = Config {
        encoding_key: SECRET.to_string(),
        ..Config::default()
    };
    let pipeline = Pipeline::from_config(&config).expect("Failed to build pipeline");

    let state = AppState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
        store: store.clone(),
    };

    (create_app(state), store, temp_db)
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

async fn response_text(body: Body) -> String {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

fn create_request(url: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/urls")
        .header(header::HOST, "proxy.test")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "url": url }).to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::HOST, "localhost:8080")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_create_proxy_url_success() {
    let (app, _store, _temp_db) = setup_test_app();

    let response = app
        .oneshot(create_request("https://example.com/test"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response.into_body()).await;
    let token = body["id"].as_str().unwrap();
    assert_eq!(body["original_url"], "https://example.com/test");
    assert_eq!(body["proxy_url"], format!("http://proxy.test/{token}"));
    assert_eq!(
        TokenCodec::new(SECRET).decode(token).unwrap(),
        "https://example.com/test"
    );
}

#[tokio::test]
async fn test_create_proxy_url_adds_scheme() {
    let (app, _store, _temp_db) = setup_test_app();

    let response = app.oneshot(create_request("example.com/page")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["original_url"], "https://example.com/page");
}

#[tokio::test]
async fn test_create_proxy_url_deduplicates() {
    let (app, _store, _temp_db) = setup_test_app();

    let first = app
        .clone()
        .oneshot(create_request("https://example.com/same"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = response_json(first.into_body()).await;

    let second = app
        .oneshot(create_request("https://example.com/same"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = response_json(second.into_body()).await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["created_at"], second["created_at"]);
}

#[tokio::test]
async fn test_create_proxy_url_rejects_invalid_input() {
    let (app, _store, _temp_db) = setup_test_app();

    for url in ["", "   ", "https://exa mple.com/"] {
        let response = app.clone().oneshot(create_request(url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{url:?}");

        let body = response_json(response.into_body()).await;
        assert_eq!(body["code"], "invalid_url");
    }
}

#[tokio::test]
async fn test_invalid_token_is_client_error() {
    let (app, _store, _temp_db) = setup_test_app();

    for uri in ["/short", "/00000000aHR0cHMlM0EvL2V4YW1wbGUuY29t"] {
        let response = app.clone().oneshot(get_request(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response_json(response.into_body()).await;
        assert_eq!(body["error"], "Invalid link");
        assert_eq!(body["code"], "invalid_link");
    }
}

#[tokio::test]
async fn test_token_from_other_key_rejected() {
    let (app, _store, _temp_db) = setup_test_app();
    let token = TokenCodec::new("someone-else").encode("data:text/plain,hi");

    let response = app.oneshot(get_request(&format!("/{token}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_proxy_serves_non_html_verbatim() {
    let (app, _store, _temp_db) = setup_test_app();
    let token = TokenCodec::new(SECRET).encode("data:text/plain;base64,aGVsbG8=");

    let response = app.oneshot(get_request(&format!("/{token}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(response_text(response.into_body()).await, "hello");
}

#[tokio::test]
async fn test_proxy_rewrites_html() {
    let (app, _store, _temp_db) = setup_test_app();
    let codec = TokenCodec::new(SECRET);
    let page = r#"data:text/html,<html><head></head><body><a href="https://example.com/next">next</a></body></html>"#;
    let token = codec.encode(page);

    let response = app.oneshot(get_request(&format!("/{token}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");

    let html = response_text(response.into_body()).await;
    assert!(html.contains("upgrade-insecure-requests"), "{html}");

    // Loopback proxy base stays on http
    let next = codec.encode("https://example.com/next");
    assert!(
        html.contains(&format!(r#"href="http://localhost:8080/{next}""#)),
        "{html}"
    );
}

#[tokio::test]
async fn test_proxy_counts_access() {
    let (app, store, _temp_db) = setup_test_app();
    let url = "data:text/plain,counted";
    let token = TokenCodec::new(SECRET).encode(url);
    store.insert(url, &token).unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get_request(&format!("/{token}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(get_request(&format!("/api/urls/{token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    assert_eq!(body["original_url"], url);
    assert_eq!(body["encoded_id"], token);
    assert_eq!(body["access_count"], 2);
}

#[tokio::test]
async fn test_proxy_works_without_stored_mapping() {
    let (app, store, _temp_db) = setup_test_app();
    let token = TokenCodec::new(SECRET).encode("data:text/plain,unstored");

    let response = app.oneshot(get_request(&format!("/{token}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response.into_body()).await, "unstored");
    assert!(store.find_by_token(&token).unwrap().is_none());
}

#[tokio::test]
async fn test_mapping_not_found() {
    let (app, _store, _temp_db) = setup_test_app();

    let response = app
        .oneshot(get_request("/api/urls/nonexistent"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_unsupported_scheme_surfaces_as_400() {
    let (app, _store, _temp_db) = setup_test_app();
    let token = TokenCodec::new(SECRET).encode("ftp://files.example.com/");

    let response = app.oneshot(get_request(&format!("/{token}"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_text(response.into_body()).await,
        "Unsupported URL scheme: ftp"
    );
}

#[tokio::test]
async fn test_query_string_forwarded_to_origin() {
    let origin = Router::new()
        .route(
            "/echo",
            get(|uri: axum::http::Uri| async move { uri.query().unwrap_or_default().to_string() }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "nothing here") }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, origin).await.unwrap();
    });

    let (app, _store, _temp_db) = setup_test_app();
    let codec = TokenCodec::new(SECRET);

    let echo = codec.encode(&format!("http://{addr}/echo?fixed=1"));
    let response = app
        .clone()
        .oneshot(get_request(&format!("/{echo}?page=2&sort=asc")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response_text(response.into_body()).await,
        "fixed=1&page=2&sort=asc"
    );

    // Origin error statuses pass through untouched
    let missing = codec.encode(&format!("http://{addr}/missing"));
    let response = app
        .oneshot(get_request(&format!("/{missing}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_text(response.into_body()).await, "nothing here");
}

#[tokio::test]
async fn test_healthz() {
    let (app, _store, _temp_db) = setup_test_app();

    let response = app.oneshot(get_request("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response.into_body()).await, "ok");
}
