//! Proxy reference resolver
//!
//! Decides, for every reference found in a proxied page, whether it is passed
//! through untouched, joined onto the proxy as a static asset, or resolved to
//! an absolute URL and replaced by a proxy token.
//!
//! Rules, first match wins:
//! 1. Pass-through: `data:`, `javascript:`, `about:`, `blob:`, `mailto:` and pure
//!    `#fragment` references are returned unchanged.
//! 2. Asset shortcut: references starting with the asset prefix are appended
//!    literally to the proxy base URL.
//! 3. Everything else is made absolute against the page URL, encoded, and joined
//!    onto the proxy base URL.

use std::net::IpAddr;

use tracing::debug;
use url::{Host, Url};

use crate::codec::TokenCodec;
use crate::error::ResolveError;

/// Schemes whose references are never rewritten
pub const PASS_THROUGH_SCHEMES: &[&str] = &["data:", "javascript:", "about:", "blob:", "mailto:"];

/// The page being rewritten and the proxy it is served through.
///
/// Built once per fetch-and-rewrite operation.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    original_url: Url,
    proxy_base_url: Url,
}

impl ProxyContext {
    /// Parses both URLs. The proxy base is upgraded to `https` unless it is a
    /// loopback address.
    pub fn new(original_url: &str, proxy_base_url: &str) -> Result<Self, url::ParseError> {
        let original_url = Url::parse(original_url)?;
        let mut proxy_base_url = Url::parse(proxy_base_url)?;

        if proxy_base_url.scheme() == "http" && !is_loopback(&proxy_base_url) {
            // http -> https is always a permitted scheme change
            let _ = proxy_base_url.set_scheme("https");
        }

        Ok(Self {
            original_url,
            proxy_base_url,
        })
    }

    pub fn original_url(&self) -> &Url {
        &self.original_url
    }

    pub fn proxy_base_url(&self) -> &Url {
        &self.proxy_base_url
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

/// Whether `reference` already carries a `scheme://` prefix.
fn is_absolute(reference: &str) -> bool {
    match reference.split_once("://") {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Turns raw page references into proxy references.
#[derive(Debug, Clone)]
pub struct Resolver {
    codec: TokenCodec,
    asset_prefix: String,
}

impl Resolver {
    pub fn new(codec: TokenCodec, asset_prefix: impl Into<String>) -> Self {
        Self {
            codec,
            asset_prefix: asset_prefix.into(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn asset_prefix(&self) -> &str {
        &self.asset_prefix
    }

    /// Whether `reference` must be left exactly as written.
    pub fn is_pass_through(reference: &str) -> bool {
        let reference = reference.trim();
        if reference.starts_with('#') {
            return true;
        }

        let lowered = reference.to_ascii_lowercase();
        PASS_THROUGH_SCHEMES
            .iter()
            .any(|scheme| lowered.starts_with(scheme))
    }

    /// Resolves one reference found in the page described by `context`.
    ///
    /// # Errors
    ///
    /// [`ResolveError::Join`] when a relative reference cannot be resolved against
    /// the page URL (for example when the page itself is a `data:` URL).
    pub fn resolve(&self, context: &ProxyContext, raw_reference: &str) -> Result<String, ResolveError> {
        if Self::is_pass_through(raw_reference) {
            return Ok(raw_reference.to_string());
        }

        let reference = raw_reference.trim();

        if reference.starts_with(&self.asset_prefix) {
            let base = context.proxy_base_url.as_str().trim_end_matches('/');
            let asset = format!("{}/{}", base, reference.trim_start_matches('/'));
            debug!(reference, asset = %asset, "asset shortcut");
            return Ok(asset);
        }

        let absolute = if is_absolute(reference) {
            reference.to_string()
        } else {
            context
                .original_url
                .join(reference)
                .map_err(|source| ResolveError::Join {
                    reference: reference.to_string(),
                    source,
                })?
                .to_string()
        };

        let token = self.codec.encode(&absolute);
        let proxied = context
            .proxy_base_url
            .join(&token)
            .map_err(|source| ResolveError::Join {
                reference: token.clone(),
                source,
            })?;

        debug!(reference, absolute = %absolute, proxied = %proxied, "resolved reference");
        Ok(proxied.to_string())
    }
}
