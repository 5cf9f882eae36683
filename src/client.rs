//! HTTP client implementation for the online storage service

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::session::{encode_segment, Secret, Session, Snapshot};
use crate::tls::build_tls_config;
use crate::types::*;

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Body sent with `backup` and `restore_backup`
const EMPTY_OBJECT: &[u8] = b"{}";

/// Path suffix addressing one key or backup reference.
fn segment_path(prefix: &str, segment: &str, what: &str) -> Result<String> {
    if segment.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", what)));
    }
    Ok(format!("{}/{}", prefix, encode_segment(segment)))
}

/// Client for one storage namespace
///
/// The client owns the session (host, token, refresh token, change-password).
/// Clones share the session and the connection pool, so a token obtained with
/// [`Client::create`] or rotated with [`Client::refresh`] is seen by every clone.
/// Each request reads the session once when it is dispatched.
///
/// # Example
/// ```rust,no_run
/// use online_storage::{Client, CreateOptions};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), online_storage::Error> {
///     let client = Client::new()?;
///     client.create(CreateOptions::new().domain("example.com")).await?;
///
///     client.set(&json!({"theme": "dark"})).await?;
///     let theme = client.get("theme").await?;
///     println!("theme = {}", theme);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    session: Arc<RwLock<Session>>,
    http_client: HttpClient<HttpsConnector, Full<Bytes>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session", &*self.read_session())
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

impl Client {
    /// Create a client for the public service without a session.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client for the given host without a session.
    ///
    /// # Errors
    /// Returns an error if the host is not an http(s) URL
    pub fn with_host(host: &str) -> Result<Self> {
        Self::with_config(ClientConfig {
            host: host.to_string(),
            ..Default::default()
        })
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let tls_config =
            build_tls_config(config.ssl_fingerprint.as_deref(), config.reject_unauthorized)?;

        let builder = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http();
        let https_connector = if config.http2_only {
            builder.enable_http2().build()
        } else {
            builder.enable_all_versions().build()
        };

        let http_client = HttpClient::builder(TokioExecutor::new())
            .http2_only(config.http2_only)
            .build(https_connector);

        let mut session = Session::new(&config.host);
        session.configure(ConfigureOptions {
            host: None,
            token: config.token.clone(),
            password: config.password.clone(),
        });

        Ok(Self {
            config: Arc::new(config),
            session: Arc::new(RwLock::new(session)),
            http_client,
        })
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Result<Snapshot> {
        self.read_session().snapshot()
    }

    /// Overwrite session fields; absent or empty values are ignored.
    ///
    /// # Example
    /// ```
    /// use online_storage::{Client, ConfigureOptions};
    ///
    /// let client = Client::new().unwrap();
    /// client.configure(ConfigureOptions::new().token("T"));
    /// assert_eq!(client.url().unwrap(), "https://storage.hazratgs.com/T");
    /// ```
    pub fn configure(&self, options: ConfigureOptions) {
        self.write_session().configure(options);
    }

    /// Base URL of the storage: `{host}/{token}`
    ///
    /// # Errors
    /// `InvalidState` when no token is set
    pub fn url(&self) -> Result<String> {
        self.read_session().url()
    }

    /// Current service address
    pub fn host(&self) -> String {
        self.read_session().host().to_string()
    }

    /// Current session token
    pub fn token(&self) -> Option<String> {
        self.read_session().token().map(str::to_string)
    }

    /// Current refresh token
    pub fn refresh_token(&self) -> Option<String> {
        self.read_session().refresh_token().map(str::to_string)
    }

    /// Restore a refresh token saved from an earlier session.
    pub fn set_refresh_token(&self, refresh_token: Option<String>) {
        self.write_session().set_refresh_token(refresh_token);
    }

    /// Whether a change-password is sent with mutating requests
    pub fn has_password(&self) -> bool {
        self.read_session().has_password()
    }

    /// Stop sending the change-password.
    pub fn clear_password(&self) {
        self.write_session().set_password(None);
    }

    /// Internal request method
    async fn send(
        &self,
        method: Method,
        base: &str,
        path: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<(StatusCode, Bytes)> {
        let url = format!("{}{}", base, path);
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid request URL: {}", e)))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(Error::InvalidUrl(
                "Request URL must be absolute (http:// or https://)".to_string(),
            ));
        }

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header("accept", "application/json")
            .header("content-type", "application/json");
        if let Some(request_headers) = builder.headers_mut() {
            request_headers.extend(headers);
        }

        let req = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| Error::InvalidArgument(format!("Failed to build request: {}", e)))?;

        // path never contains the token
        debug!("Sending request: {} {}", method, path);

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let response = tokio::time::timeout(timeout, self.http_client.request(req))
            .await
            .map_err(|_| Error::Timeout(self.config.timeout_ms))?
            .map_err(|e| Error::Connection(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = Self::read_body(response.into_body()).await?;
        debug!("Response: {} {} -> {}", method, path, status);
        Ok((status, body))
    }

    /// Read response body to bytes
    async fn read_body(body: Incoming) -> Result<Bytes> {
        let collected = body
            .collect()
            .await
            .map_err(|e| Error::Connection(format!("Failed to read response body: {}", e)))?;
        Ok(collected.to_bytes())
    }

    /// Send a request and decode the service envelope.
    ///
    /// An envelope is honoured whatever the HTTP status; only bodies that are
    /// not an envelope are classified by status code.
    async fn call(
        &self,
        method: Method,
        base: &str,
        path: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Envelope> {
        let (status, body) = self.send(method, base, path, headers, body).await?;

        match serde_json::from_slice::<Envelope>(&body) {
            Ok(envelope) => {
                if !envelope.status {
                    warn!(
                        "Service rejected {}: {}",
                        path,
                        envelope.description.as_deref().unwrap_or("no description")
                    );
                }
                Ok(envelope)
            }
            Err(e) if status.is_success() => Err(Error::Json(e)),
            Err(_) => Err(Error::Http {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            }),
        }
    }

    /// Create a new storage and make it the client's session
    ///
    /// On success the returned token, refresh token and (when given) the
    /// password become the session.
    ///
    /// # Errors
    /// `Service` with the service's description when creation is refused
    ///
    /// # Example
    /// ```rust,no_run
    /// # use online_storage::{Client, CreateOptions};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), online_storage::Error> {
    /// let client = Client::new()?;
    /// let created = client
    ///     .create(CreateOptions::new().domain("example.com").password("change-me"))
    ///     .await?;
    /// println!("token: {:?}", created.data.map(|c| c.token));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create(&self, options: CreateOptions) -> Result<Envelope<Credentials>> {
        let host = self.host();
        let body = serde_json::to_vec(&options)?;

        let envelope = self
            .call(Method::POST, &host, "/create", HeaderMap::new(), Some(Bytes::from(body)))
            .await?
            .check()?;
        let credentials: Credentials =
            serde_json::from_value(envelope.data.unwrap_or(Value::Null))?;

        {
            let mut session = self.write_session();
            if let Some(password) = options.password.filter(|p| !p.is_empty()) {
                session.set_password(Some(password));
            }
            session.set_token(credentials.token.clone());
            session.set_refresh_token(credentials.refresh_token.clone());
        }
        info!("Storage created on {}", host);

        Ok(Envelope {
            status: envelope.status,
            description: envelope.description,
            data: Some(credentials),
        })
    }

    /// Rotate the session token using the refresh token
    ///
    /// The new token replaces the current one and is returned as `data`.
    pub async fn refresh(&self) -> Result<Envelope<String>> {
        let snapshot = self.snapshot()?;
        let body = serde_json::to_vec(&RefreshRequest {
            refresh_token: snapshot.refresh_token.as_ref().map(Secret::as_str),
        })?;

        let envelope = self
            .call(
                Method::POST,
                &snapshot.url,
                "/refresh",
                HeaderMap::new(),
                Some(Bytes::from(body)),
            )
            .await?
            .check()?;
        let token: String = serde_json::from_value(envelope.data.unwrap_or(Value::Null))?;

        self.write_session().set_token(token.clone());
        info!("Session token refreshed");

        Ok(Envelope {
            status: envelope.status,
            description: envelope.description,
            data: Some(token),
        })
    }

    /// Retrieve the value stored under `key`
    ///
    /// Returns only the envelope's `data`; a missing payload is `Value::Null`.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use online_storage::{Client, ConfigureOptions};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), online_storage::Error> {
    /// # let client = Client::new()?;
    /// client.configure(ConfigureOptions::new().token("my-token"));
    /// let user = client.get("user").await?;
    /// println!("user: {}", user);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get(&self, key: &str) -> Result<Value> {
        let snapshot = self.snapshot()?;
        let path = segment_path("", key, "key")?;

        let envelope = self
            .call(Method::GET, &snapshot.url, &path, HeaderMap::new(), None)
            .await?;
        Ok(envelope.into_data()?.unwrap_or(Value::Null))
    }

    /// Retrieve the value stored under `key` as a typed value (convenience method)
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        Ok(serde_json::from_value(self.get(key).await?)?)
    }

    /// Write `data` into the storage
    ///
    /// `data` is sent as the JSON request body; the service merges it into the
    /// stored values. Returns the envelope's `data`.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use online_storage::Client;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), online_storage::Error> {
    /// # let client = Client::new()?;
    /// client.set(&serde_json::json!({"user": {"name": "John"}})).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set<T: Serialize + ?Sized>(&self, data: &T) -> Result<Value> {
        let snapshot = self.snapshot()?;
        let body = serde_json::to_vec(data)?;

        let envelope = self
            .call(
                Method::POST,
                &snapshot.url,
                "",
                snapshot.headers()?,
                Some(Bytes::from(body)),
            )
            .await?;
        Ok(envelope.into_data()?.unwrap_or(Value::Null))
    }

    /// Delete one key
    ///
    /// # Returns
    /// The envelope's `status` flag as reported by the service
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let snapshot = self.snapshot()?;
        let path = segment_path("", key, "key")?;

        let envelope = self
            .call(Method::DELETE, &snapshot.url, &path, snapshot.headers()?, None)
            .await?;
        Ok(envelope.status)
    }

    /// Delete every key in the storage
    ///
    /// # Returns
    /// The envelope's `status` flag as reported by the service
    pub async fn delete_all(&self) -> Result<bool> {
        let snapshot = self.snapshot()?;

        let envelope = self
            .call(Method::DELETE, &snapshot.url, "", snapshot.headers()?, None)
            .await?;
        Ok(envelope.status)
    }

    /// Snapshot the storage; returns the new backup's reference
    pub async fn backup(&self) -> Result<Value> {
        let snapshot = self.snapshot()?;

        let envelope = self
            .call(
                Method::POST,
                &snapshot.url,
                "/backup",
                snapshot.headers()?,
                Some(Bytes::from_static(EMPTY_OBJECT)),
            )
            .await?;
        Ok(envelope.into_data()?.unwrap_or(Value::Null))
    }

    /// List the storage's backups
    ///
    /// A `null` payload is an empty list.
    pub async fn list_backups(&self) -> Result<Vec<Value>> {
        let snapshot = self.snapshot()?;

        let envelope = self
            .call(Method::GET, &snapshot.url, "/backup/list", snapshot.headers()?, None)
            .await?;
        match envelope.into_data()? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(data) => Ok(serde_json::from_value(data)?),
        }
    }

    /// Replace the storage content with the backup identified by `key`
    pub async fn restore_backup(&self, key: &str) -> Result<Value> {
        let snapshot = self.snapshot()?;
        let path = segment_path("/backup", key, "backup reference")?;

        let envelope = self
            .call(
                Method::POST,
                &snapshot.url,
                &path,
                snapshot.headers()?,
                Some(Bytes::from_static(EMPTY_OBJECT)),
            )
            .await?;
        Ok(envelope.into_data()?.unwrap_or(Value::Null))
    }
}
