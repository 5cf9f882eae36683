//! Error types for the online storage client

use thiserror::Error;

/// Errors that can occur when talking to the storage service
#[derive(Error, Debug)]
pub enum Error {
    /// The session has no token yet; call `create` or `configure` first
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A caller-supplied argument cannot be sent (empty key, bad header value)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The service answered with `status: false`
    #[error("Service error: {0}")]
    Service(String),

    /// Non-2xx response that did not carry a service envelope
    #[error("HTTP error (status {status}): {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Raw response body
        message: String,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    Tls(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised before any request was sent because the session lacks a token
    InvalidState,
    /// Raised before any request was sent because an argument was unusable
    InvalidInput,
    /// The service processed the request and reported a failure
    Service,
    /// The request or response failed below the envelope layer
    Transport,
}

impl Error {
    /// Error raised by every authenticated operation without a token.
    pub(crate) fn token_missing() -> Self {
        Error::InvalidState("Token not specified".to_string())
    }

    /// Classifies the error so callers can branch without matching every variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::InvalidArgument(_) => ErrorKind::InvalidInput,
            Error::Service(_) => ErrorKind::Service,
            Error::Http { .. }
            | Error::Connection(_)
            | Error::Timeout(_)
            | Error::Tls(_)
            | Error::InvalidUrl(_)
            | Error::Json(_) => ErrorKind::Transport,
        }
    }

    /// Message reported by the service, if this is a service error.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            Error::Service(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
