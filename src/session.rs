//! Session state and per-request derivation of URLs and headers

use std::fmt;

use http::{HeaderMap, HeaderValue};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::types::ConfigureOptions;

/// Address of the public storage service
pub const DEFAULT_HOST: &str = "https://storage.hazratgs.com";

/// Header carrying the change-password
pub const PASSWORD_HEADER: &str = "password";

/// Unreserved and sub-delim characters from RFC 3986 minus `/`, so that a key
/// always stays a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Percent-encode a key or backup reference for use as one URI path segment.
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Credential string that is zeroed on drop and never printed.
#[derive(Clone)]
pub(crate) struct Secret(String);

impl Secret {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Keeps only values that were provided and are not empty.
fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Mutable state of one client: where to talk to and with which credentials.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    host: String,
    token: Option<Secret>,
    refresh_token: Option<Secret>,
    password: Option<Secret>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl Session {
    pub(crate) fn new(host: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            token: None,
            refresh_token: None,
            password: None,
        }
    }

    /// Overwrites every provided, non-empty field.
    pub(crate) fn configure(&mut self, options: ConfigureOptions) {
        if let Some(host) = provided(options.host) {
            self.host = host.trim_end_matches('/').to_string();
        }
        if let Some(token) = provided(options.token) {
            self.token = Some(Secret::new(token));
        }
        if let Some(password) = provided(options.password) {
            self.password = Some(Secret::new(password));
        }
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_ref().map(Secret::as_str)
    }

    pub(crate) fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(Secret::as_str)
    }

    pub(crate) fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub(crate) fn set_token(&mut self, token: String) {
        self.token = Some(Secret::new(token));
    }

    pub(crate) fn set_refresh_token(&mut self, refresh_token: Option<String>) {
        self.refresh_token = provided(refresh_token).map(Secret::new);
    }

    pub(crate) fn set_password(&mut self, password: Option<String>) {
        self.password = provided(password).map(Secret::new);
    }

    /// Fails with `InvalidState` unless a token is present.
    pub(crate) fn require_token(&self) -> Result<&str> {
        self.token().ok_or_else(Error::token_missing)
    }

    /// Base URL of every authenticated request: `{host}/{token}`.
    pub(crate) fn url(&self) -> Result<String> {
        let token = self.require_token()?;
        Ok(format!("{}/{}", self.host, encode_segment(token)))
    }

    /// Captures everything an authenticated request needs at dispatch time.
    pub(crate) fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            url: self.url()?,
            password: self.password.clone(),
            refresh_token: self.refresh_token.clone(),
        })
    }
}

fn password_headers(password: Option<&Secret>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(password) = password {
        let mut value = HeaderValue::from_str(password.as_str()).map_err(|_| {
            Error::InvalidArgument("password is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        headers.insert(PASSWORD_HEADER, value);
    }
    Ok(headers)
}

/// Session values read once at dispatch; later session changes do not affect it.
#[derive(Debug)]
pub(crate) struct Snapshot {
    pub(crate) url: String,
    pub(crate) refresh_token: Option<Secret>,
    password: Option<Secret>,
}

impl Snapshot {
    /// Headers for operations that carry the change-password.
    pub(crate) fn headers(&self) -> Result<HeaderMap> {
        password_headers(self.password.as_ref())
    }
}
