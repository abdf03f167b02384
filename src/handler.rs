//! HTTP request handlers for the proxy
//!
//! This module implements the web boundary around the pipeline:
//! - Issuing proxy links (with deduplication through the mapping store)
//! - Serving proxied content for a token
//! - Reporting mapping statistics

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::error::ProxyError;
use crate::fetcher::FetchResult;
use crate::model::{CreateRequest, CreateResponse, UrlMapping};
use crate::route::AppState;

/// Base URL of the proxy as seen by the client making this request
fn proxy_base_url(state: &AppState, headers: &HeaderMap) -> String {
    let host = headers.get(header::HOST).and_then(|h| h.to_str().ok());
    state.config.proxy_base_url(host)
}

/// Issues a proxy link for a URL
///
/// # Request Body
///
/// ```json
/// { "url": "https://example.com/very/long/url" }
/// ```
///
/// # Response
///
/// - **201 Created** - New mapping created
/// - **200 OK** - URL was already known; the existing token is returned
/// - **400 Bad Request** - URL is empty or does not parse
pub async fn create_proxy_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRequest>,
) -> Result<Response, ProxyError> {
    let (original_url, token) = state.pipeline.encode(&payload.url)?;

    // Reuse a previously issued token for the same URL
    let (mapping, created) = state.store.insert(&original_url, &token)?;

    let base = proxy_base_url(&state, &headers);
    let response = CreateResponse {
        proxy_url: format!("{}/{}", base.trim_end_matches('/'), mapping.encoded_id),
        id: mapping.encoded_id,
        original_url: mapping.original_url,
        created_at: mapping.created_at,
    };

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)).into_response())
}

/// Returns the stored mapping for a token
///
/// # Response
///
/// - **200 OK** - Mapping including `access_count`
/// - **404 Not Found** - Token was never issued through this proxy
pub async fn get_mapping(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UrlMapping>, ProxyError> {
    state
        .store
        .find_by_token(&token)?
        .map(Json)
        .ok_or(ProxyError::NotFound)
}

/// Serves the content behind a token
///
/// Decodes the token, fetches the target (with the inbound query string
/// appended) and rewrites it when it is HTML. The origin's status code and
/// content type are forwarded as-is.
///
/// # Response
///
/// - Origin status with the (rewritten) body
/// - **400 Bad Request** - `{"error": "Invalid link"}` for undecodable tokens
/// - **500 Internal Server Error** - Origin unreachable
pub async fn proxy_content(
    Path(token): Path<String>,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let base = proxy_base_url(&state, &headers);
    let result = state.pipeline.serve(&token, query.as_deref(), &base).await?;

    // Access counting must never fail the proxied response
    if let Err(err) = state.store.record_access(&token) {
        warn!(error = %err, "failed to record access");
    }

    Ok(fetch_response(result))
}

fn fetch_response(result: FetchResult) -> Response {
    let status = StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut response = Response::new(Body::from(result.content));
    *response.status_mut() = status;

    if let Some(value) = result
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }

    response
}

/// Liveness probe
pub async fn healthz() -> &'static str {
    "ok"
}
