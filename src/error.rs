//! Error types for the proxy
//!
//! Each component owns a small error enum; [`ProxyError`] is the top-level
//! taxonomy surfaced at the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why a token was rejected by the codec.
///
/// Corruption and tampering are indistinguishable; both surface as
/// [`TokenError::SignatureMismatch`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is shorter than the signature prefix")]
    TooShort,

    #[error("token signature does not match its body")]
    SignatureMismatch,

    #[error("token body is not valid base64: {0}")]
    Base64(String),

    #[error("token body is not valid UTF-8")]
    Utf8,
}

/// Transport-level failure talking to an origin (connection, TLS, timeout).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    /// The origin could not be reached (refused, DNS, TLS handshake)
    #[error("connection failed: {0}")]
    Connect(String),
}

/// Reasons the rewrite engine gave up on a document.
///
/// Never surfaced to clients: the original document is served instead.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("unsupported document encoding: {0}")]
    Encoding(&'static str),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTML rewriting failed: {0}")]
    Rewriting(#[from] lol_html::errors::RewritingError),
}

/// A single reference that could not be turned into a proxy reference.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("cannot resolve {reference:?}: {source}")]
    Join {
        reference: String,
        #[source]
        source: url::ParseError,
    },
}

/// Failures of the persisted mapping store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("database open error: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("corrupt record: {0}")]
    Record(#[from] serde_json::Error),
}

/// Top-level error taxonomy of the proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid link: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Error fetching content: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Not found")]
    NotFound,
}

impl ProxyError {
    /// HTTP status and machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ProxyError::InvalidToken(_) => (StatusCode::BAD_REQUEST, "invalid_link"),
            ProxyError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            ProxyError::UnsupportedScheme(_) => (StatusCode::BAD_REQUEST, "unsupported_scheme"),
            ProxyError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transport_failure"),
            ProxyError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ProxyError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Token failures never leak which check rejected the link
        let message = match &self {
            ProxyError::InvalidToken(_) => "Invalid link".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
