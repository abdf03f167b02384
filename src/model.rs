//! Data models for the proxy
//!
//! This module defines the request/response bodies of the HTTP API and the
//! mapping record persisted in the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A URL that has been issued a token
///
/// Stored as JSON in the `url_mappings_v1` table, keyed by `original_url`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UrlMapping {
    /// Sequential identifier, assigned on first insert
    pub id: u64,

    /// The URL the token resolves to
    pub original_url: String,

    /// The token issued for `original_url` (unique)
    pub encoded_id: String,

    /// Timestamp when this mapping was created
    pub created_at: DateTime<Utc>,

    /// Number of times the token has been served through the proxy
    #[serde(default)]
    pub access_count: u64,
}

/// Request payload for issuing a proxy link
///
/// # Example
/// ```json
/// { "url": "https://example.com/some/page" }
/// ```
#[derive(Deserialize)]
pub struct CreateRequest {
    /// The URL to proxy. `https://` is assumed when no scheme is given.
    pub url: String,
}

/// Response returned after issuing a proxy link
///
/// # Example
/// ```json
/// {
///   "id": "3eed359baHR0cHMlM0EvL2V4YW1wbGUuY29t",
///   "proxy_url": "http://localhost:8080/3eed359baHR0cHMlM0EvL2V4YW1wbGUuY29t",
///   "original_url": "https://example.com",
///   "created_at": "2026-01-17T13:40:00Z"
/// }
/// ```
#[derive(Serialize)]
pub struct CreateResponse {
    /// The token
    pub id: String,

    /// Full proxy link for the token
    pub proxy_url: String,

    pub original_url: String,

    pub created_at: DateTime<Utc>,
}
