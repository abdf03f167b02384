//! Token codec
//!
//! Turns an arbitrary URL into a short, URL-safe token and back.
//!
//! A token is `hash8 || body` where:
//! - `body` is the unpadded URL-safe base64 of the percent-encoded URL
//! - `hash8` is the first 8 hex characters of `SHA-256(body || secret_key)`
//!
//! The signature only detects tampering. Anyone holding a token can recover
//! the URL; the proxy is the one meant to resolve it.
//!
//! # Example
//!
//! ```
//! # use linkproxy::codec::TokenCodec;
//! let codec = TokenCodec::new("mySecretKey123");
//! let token = codec.encode("https://example.com");
//! assert_eq!(token, "3eed359baHR0cHMlM0EvL2V4YW1wbGUuY29t");
//! assert_eq!(codec.decode(&token).unwrap(), "https://example.com");
//! ```

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::TokenError;

/// Length of the hex signature prefix
pub const SIGNATURE_LEN: usize = 8;

/// Bytes that stay literal when percent-encoding: unreserved characters and `/`.
const URL_ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Reversible, tamper-evident URL codec keyed by a secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret_key: String,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }

    /// Encodes `url` into a token.
    pub fn encode(&self, url: &str) -> String {
        let escaped = utf8_percent_encode(url, URL_ESCAPE_SET).to_string();
        let body = URL_SAFE_NO_PAD.encode(escaped.as_bytes());
        let token = format!("{}{}", self.signature(&body), body);

        debug!(url, token = %token, "encoded url");
        token
    }

    /// Decodes a token back into its URL.
    ///
    /// # Errors
    ///
    /// - [`TokenError::TooShort`] - fewer than 8 bytes
    /// - [`TokenError::SignatureMismatch`] - hash prefix does not match the body
    /// - [`TokenError::Base64`] / [`TokenError::Utf8`] - body does not decode
    pub fn decode(&self, token: &str) -> Result<String, TokenError> {
        if token.len() < SIGNATURE_LEN || !token.is_char_boundary(SIGNATURE_LEN) {
            warn!(token, "rejected token: too short");
            return Err(TokenError::TooShort);
        }

        let (signature, body) = token.split_at(SIGNATURE_LEN);
        if self.signature(body) != signature {
            warn!(token, "rejected token: signature mismatch");
            return Err(TokenError::SignatureMismatch);
        }

        // Restore the padding stripped by `encode`
        let mut padded = body.to_string();
        let remainder = padded.len() % 4;
        if remainder != 0 {
            padded.extend(std::iter::repeat('=').take(4 - remainder));
        }

        let bytes = URL_SAFE
            .decode(padded.as_bytes())
            .map_err(|e| TokenError::Base64(e.to_string()))?;
        let escaped = String::from_utf8(bytes).map_err(|_| TokenError::Utf8)?;
        let url = percent_decode_str(&escaped)
            .decode_utf8()
            .map_err(|_| TokenError::Utf8)?
            .into_owned();

        debug!(token, url = %url, "decoded token");
        Ok(url)
    }

    fn signature(&self, body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        hasher.update(self.secret_key.as_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(SIGNATURE_LEN);
        digest
    }
}
