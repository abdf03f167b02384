//! Resource fetcher
//!
//! Retrieves the bytes, status and content type behind a URL:
//! - `data:` URIs are decoded locally, no network involved
//! - `http:` URLs are optimistically upgraded to `https:` once, falling back to
//!   the original URL only when the upgraded attempt fails at the transport level
//! - `https:` URLs are fetched as-is
//!
//! The fetcher never returns an error. Every outcome, including transport
//! failures and unsupported schemes, is reported as a [`FetchResult`] with a
//! status code the caller can forward.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, warn};

use crate::error::{ProxyError, TransportError};

/// Timeout applied to every upstream request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of redirects followed per request
pub const MAX_REDIRECTS: usize = 10;

/// Content type assumed when a successful origin response omits one
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "ja,en-US;q=0.7,en;q=0.3";

/// Outcome of fetching a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub content: Bytes,
    pub status_code: u16,
    pub content_type: Option<String>,
}

impl FetchResult {
    /// Plain-text result, used for locally generated errors
    pub fn text(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            content: Bytes::from(message.into()),
            status_code,
            content_type: Some("text/plain".to_string()),
        }
    }

    /// Whether the content should go through the rewrite engine.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }

    /// Whether the origin answered with an error status (>= 400).
    pub fn is_upstream_error(&self) -> bool {
        self.status_code >= 400
    }
}

impl From<ProxyError> for FetchResult {
    fn from(err: ProxyError) -> Self {
        let (status, _) = err.status_and_code();
        FetchResult::text(status.as_u16(), err.to_string())
    }
}

/// Raw response handed back by a [`Transport`]
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// A single GET against an origin.
///
/// Redirects are followed by the transport; the final response is returned.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client that identifies as a desktop browser.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_connect() {
                TransportError::Connect(err.to_string())
            } else {
                TransportError::Request(err)
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Fetches resources for the proxy pipeline.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetcher using [`ReqwestTransport`] with the standard timeout.
    pub fn with_default_transport() -> Result<Self, TransportError> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(REQUEST_TIMEOUT)?)))
    }

    /// Fetches `url`, always producing a [`FetchResult`].
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let lowered = url.to_ascii_lowercase();

        let result = if lowered.starts_with("data:") {
            Ok(decode_data_uri(url))
        } else if lowered.starts_with("http:") {
            self.fetch_with_upgrade(url).await
        } else if lowered.starts_with("https:") {
            self.fetch_remote(url).await
        } else {
            let scheme = url.split_once(':').map_or("unknown", |(scheme, _)| scheme);
            Err(ProxyError::UnsupportedScheme(scheme.to_string()))
        };

        result.unwrap_or_else(|err| {
            warn!(url, error = %err, "fetch failed");
            FetchResult::from(err)
        })
    }

    /// One optimistic `https:` attempt, then exactly one retry on the original URL.
    async fn fetch_with_upgrade(&self, url: &str) -> Result<FetchResult, ProxyError> {
        let upgraded = format!("https:{}", &url["http:".len()..]);
        debug!(url, upgraded = %upgraded, "trying https upgrade");

        match self.transport.get(&upgraded).await {
            Ok(raw) => Ok(checked_result(&upgraded, raw)),
            Err(err) => {
                debug!(url, error = %err, "https upgrade failed, falling back to original url");
                self.fetch_remote(url).await
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<FetchResult, ProxyError> {
        let raw = self.transport.get(url).await?;
        Ok(checked_result(url, raw))
    }
}

/// Converts an origin response, logging error statuses.
fn checked_result(url: &str, raw: RawResponse) -> FetchResult {
    let result = into_fetch_result(raw);
    if result.is_upstream_error() {
        warn!(url, status = result.status_code, "origin returned an error status");
    }
    result
}

fn into_fetch_result(raw: RawResponse) -> FetchResult {
    let content_type = match raw.content_type {
        Some(ct) => Some(ct),
        None if raw.status < 400 => Some(DEFAULT_CONTENT_TYPE.to_string()),
        None => None,
    };

    FetchResult {
        content: raw.body,
        status_code: raw.status,
        content_type,
    }
}

/// Decodes `data:[<media-type>][;base64],<payload>` without touching the network.
///
/// Payloads that fail to decode are returned as raw bytes.
pub fn decode_data_uri(url: &str) -> FetchResult {
    let Some((header, payload)) = url.split_once(',') else {
        return FetchResult::text(400, "Invalid data URI format");
    };

    // Skip the 5-byte "data:" scheme
    let params = header.get(5..).unwrap_or_default();
    let is_base64 = params
        .split(';')
        .skip(1)
        .any(|p| p.eq_ignore_ascii_case("base64"));

    let media_type = params.split(';').next().unwrap_or_default().trim();
    let content_type = if media_type.is_empty() {
        "text/plain".to_string()
    } else {
        media_type.to_string()
    };

    let content = if is_base64 {
        match STANDARD.decode(payload.as_bytes()) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                debug!(error = %err, "data URI payload is not valid base64, returning raw bytes");
                Bytes::copy_from_slice(payload.as_bytes())
            }
        }
    } else {
        Bytes::from(percent_decode_str(payload).collect::<Vec<u8>>())
    };

    FetchResult {
        content,
        status_code: 200,
        content_type: Some(content_type),
    }
}
