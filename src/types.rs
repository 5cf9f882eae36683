//! Data types exchanged with the storage service

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Uniform response wrapper returned by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    /// Whether the service accepted the request
    pub status: bool,
    /// Human-readable reason, set on failures
    #[serde(default)]
    pub description: Option<String>,
    /// Operation payload; absent and `null` both decode to `None`
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Turns a `status: false` envelope into [`Error::Service`].
    pub fn check(self) -> Result<Self> {
        if self.status {
            Ok(self)
        } else {
            let message = self
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "Unknown service error".to_string());
            Err(Error::Service(message))
        }
    }

    /// Checks the status and returns the payload.
    pub fn into_data(self) -> Result<Option<T>> {
        Ok(self.check()?.data)
    }
}

/// Payload of a successful `create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Session token scoping all further requests
    pub token: String,
    /// Token used to rotate the session token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Options for creating a new storage namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateOptions {
    /// Domains allowed to use the storage
    pub domains: Option<Vec<String>>,
    /// Backup reference to seed the new storage from
    pub backup: Option<String>,
    /// Change-password protecting mutating operations
    pub password: Option<String>,
}

impl CreateOptions {
    /// Empty options: every field is sent as `null`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allowed domain.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.get_or_insert_with(Vec::new).push(domain.into());
        self
    }

    /// Seeds the new storage from a backup.
    pub fn backup(mut self, backup: impl Into<String>) -> Self {
        self.backup = Some(backup.into());
        self
    }

    /// Protects mutating operations with a password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Session fields to overwrite; `None` and empty strings leave the field as is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigureOptions {
    /// Service address, e.g. `https://storage.hazratgs.com`
    pub host: Option<String>,
    /// Session token
    pub token: Option<String>,
    /// Change-password
    pub password: Option<String>,
}

impl ConfigureOptions {
    /// Options that change nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Body of a token refresh request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: Option<&'a str>,
}
