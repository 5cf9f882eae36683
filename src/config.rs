//! Client configuration and `STORAGE_*` environment loading

use std::env;

use url::Url;

use crate::error::{Error, Result};
use crate::session::DEFAULT_HOST;

/// Configuration options for the storage client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service address (default: https://storage.hazratgs.com)
    pub host: String,
    /// Session token of an existing storage, if already known
    pub token: Option<String>,
    /// Change-password sent with mutating requests
    pub password: Option<String>,
    /// Request timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Speak HTTP/2 only (prior knowledge on plaintext hosts)
    pub http2_only: bool,
    /// Optional SSL certificate fingerprint (SHA-256 hex) for certificate pinning.
    /// Accepts hex with or without colons. Requires an https:// host.
    pub ssl_fingerprint: Option<String>,
    /// Enable TLS verification (default: true).
    /// When false, any certificate is accepted (self-signed hosts).
    pub reject_unauthorized: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            token: None,
            password: None,
            timeout_ms: 30000,
            http2_only: false,
            ssl_fingerprint: None,
            reject_unauthorized: true,
        }
    }
}

impl ClientConfig {
    /// Reads `STORAGE_*` environment variables on top of the defaults and
    /// validates the result.
    ///
    /// Unset or empty variables keep the default; unparsable numbers and
    /// booleans fall back to the default as well. A zero timeout counts as
    /// unparsable.
    pub fn from_env() -> Result<Self> {
        let config = Self::from_env_unchecked();
        config.validate()?;
        Ok(config)
    }

    /// Same as [`ClientConfig::from_env`] without [`ClientConfig::validate`],
    /// for callers that still apply their own overrides.
    pub fn from_env_unchecked() -> Self {
        let defaults = Self::default();

        let host = non_empty_var("STORAGE_HOST").unwrap_or(defaults.host);
        let timeout_ms = non_empty_var("STORAGE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .filter(|ms: &u64| *ms > 0)
            .unwrap_or(defaults.timeout_ms);
        let http2_only = non_empty_var("STORAGE_HTTP2_ONLY")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.http2_only);
        let reject_unauthorized = non_empty_var("STORAGE_REJECT_UNAUTHORIZED")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.reject_unauthorized);

        ClientConfig {
            host,
            token: non_empty_var("STORAGE_TOKEN"),
            password: non_empty_var("STORAGE_PASSWORD"),
            timeout_ms,
            http2_only,
            ssl_fingerprint: non_empty_var("STORAGE_SSL_FINGERPRINT"),
            reject_unauthorized,
        }
    }

    /// Checks the host is an absolute http(s) URL and that pinning is only
    /// requested for https.
    pub fn validate(&self) -> Result<()> {
        validate_host(&self.host)?;
        if self.ssl_fingerprint.is_some() && !self.host.starts_with("https://") {
            return Err(Error::Tls(
                "ssl_fingerprint requires an https:// host".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accepts `http://` and `https://` URLs with a host part.
pub fn validate_host(host: &str) -> Result<()> {
    let url = Url::parse(host).map_err(|e| Error::InvalidUrl(format!("{}: {}", host, e)))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        "http" | "https" => Err(Error::InvalidUrl(format!("{}: missing host", host))),
        scheme => Err(Error::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            host, scheme
        ))),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse boolean flags (1/0, true/false, yes/no, on/off)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
