//! Runtime configuration
//!
//! All settings are read once at startup from the process environment
//! (optionally populated from a `.env` file by `dotenvy`). Components receive
//! the values they need explicitly; nothing reads the environment afterwards.

use std::env;

use tracing::warn;
use url::Url;

use crate::error::ProxyError;

/// Development fallback for `URL_ENCODING_KEY`.
pub const DEFAULT_ENCODING_KEY: &str = "mySecretKey123";

/// Reserved path prefix for static assets that bypass the token codec.
pub const DEFAULT_ASSET_PREFIX: &str = "/_assets/";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server listens on
    pub port: u16,

    /// Path of the redb database file
    pub database_url: String,

    /// Secret mixed into every token signature
    pub encoding_key: String,

    /// Externally visible base URL of the proxy.
    /// When `None`, the base is derived from the `Host` header of each request.
    pub public_url: Option<Url>,

    /// Static-asset path prefix (see [`DEFAULT_ASSET_PREFIX`])
    pub asset_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "data.db".to_string(),
            encoding_key: DEFAULT_ENCODING_KEY.to_string(),
            public_url: None,
            asset_prefix: DEFAULT_ASSET_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Builds the configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `PORT` - Server port number (default: 8080)
    /// - `DATABASE_URL` - Path to database file (default: "data.db")
    /// - `URL_ENCODING_KEY` - Token signing secret (default: development key, with a warning)
    /// - `PUBLIC_URL` - Absolute base URL of the proxy (optional)
    /// - `ASSET_PREFIX` - Reserved static asset prefix (default: "/_assets/")
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidUrl`] when `PUBLIC_URL` is set but is not an absolute URL.
    pub fn from_env() -> Result<Self, ProxyError> {
        let defaults = Self::default();

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let encoding_key = match env::var("URL_ENCODING_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => {
                warn!("URL_ENCODING_KEY is not set, falling back to the development key");
                defaults.encoding_key
            }
        };

        let public_url = match env::var("PUBLIC_URL") {
            Ok(raw) if !raw.is_empty() => Some(
                Url::parse(&raw).map_err(|e| ProxyError::InvalidUrl(format!("PUBLIC_URL: {e}")))?,
            ),
            _ => None,
        };

        let asset_prefix = env::var("ASSET_PREFIX")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.asset_prefix);

        Ok(Self {
            port,
            database_url,
            encoding_key,
            public_url,
            asset_prefix,
        })
    }

    /// Proxy base URL for a request that arrived with the given `Host` header.
    pub fn proxy_base_url(&self, host: Option<&str>) -> String {
        match (&self.public_url, host) {
            (Some(url), _) => url.to_string(),
            (None, Some(host)) => format!("http://{host}/"),
            (None, None) => format!("http://localhost:{}/", self.port),
        }
    }
}
