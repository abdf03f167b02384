//! Request pipeline
//!
//! Glues the core components together for one proxied request:
//! decode token → fetch → rewrite (HTML only) → respond.
//!
//! Every request runs independently. The pipeline holds no mutable state, so a
//! single instance is shared by all handlers.

use tracing::{debug, info};
use url::Url;

use crate::codec::TokenCodec;
use crate::config::Config;
use crate::error::{ProxyError, TransportError};
use crate::fetcher::{FetchResult, Fetcher};
use crate::resolver::Resolver;
use crate::rewrite::Rewriter;

/// Decode, fetch and rewrite in one place.
#[derive(Clone)]
pub struct Pipeline {
    codec: TokenCodec,
    fetcher: Fetcher,
    rewriter: Rewriter,
}

impl Pipeline {
    pub fn new(codec: TokenCodec, fetcher: Fetcher, asset_prefix: &str) -> Self {
        let rewriter = Rewriter::new(Resolver::new(codec.clone(), asset_prefix));
        Self {
            codec,
            fetcher,
            rewriter,
        }
    }

    /// Pipeline with the production fetcher, configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Ok(Self::new(
            TokenCodec::new(config.encoding_key.clone()),
            Fetcher::with_default_transport()?,
            &config.asset_prefix,
        ))
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Validates a user-submitted URL and returns `(normalized_url, token)`.
    ///
    /// URLs without an `http://` or `https://` prefix are assumed to be `https`.
    pub fn encode(&self, raw_url: &str) -> Result<(String, String), ProxyError> {
        let trimmed = raw_url.trim();
        if trimmed.is_empty() {
            return Err(ProxyError::InvalidUrl("URL must not be empty".to_string()));
        }

        let lowered = trimmed.to_ascii_lowercase();
        let url = if lowered.starts_with("http://") || lowered.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        Url::parse(&url).map_err(|e| ProxyError::InvalidUrl(format!("{url}: {e}")))?;

        let token = self.codec.encode(&url);
        Ok((url, token))
    }

    /// Serves one proxied request.
    ///
    /// # Arguments
    ///
    /// * `token` - Path segment of the inbound request
    /// * `query` - Inbound query string, appended to the decoded target
    /// * `proxy_base_url` - Base URL the client reached the proxy through
    ///
    /// # Errors
    ///
    /// Only [`ProxyError::InvalidToken`]. Fetch outcomes, including transport
    /// failures and upstream error statuses, are returned as a [`FetchResult`].
    pub async fn serve(
        &self,
        token: &str,
        query: Option<&str>,
        proxy_base_url: &str,
    ) -> Result<FetchResult, ProxyError> {
        let target = self.codec.decode(token)?;
        let target = append_query(target, query);

        info!(url = %target, "proxying");
        let mut result = self.fetcher.fetch(&target).await;

        if result.is_html() {
            debug!(url = %target, bytes = result.content.len(), "rewriting html");
            result.content = self
                .rewriter
                .rewrite(result.content, result.content_type.as_deref(), &target, proxy_base_url);
        }

        Ok(result)
    }
}

/// Appends the inbound query string to the decoded target URL, ahead of any fragment.
pub fn append_query(target: String, query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return target;
    };

    let (location, fragment) = match target.split_once('#') {
        Some((location, fragment)) => (location, Some(fragment)),
        None => (target.as_str(), None),
    };
    let joiner = if location.contains('?') { '&' } else { '?' };

    match fragment {
        Some(fragment) => format!("{location}{joiner}{query}#{fragment}"),
        None => format!("{location}{joiner}{query}"),
    }
}
