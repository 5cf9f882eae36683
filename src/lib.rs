//! An async client for the online key-value storage service
//!
//! The service keeps one JSON document per storage namespace, addressed by a
//! session token. This library manages that session (token, refresh token and
//! an optional change-password) and exposes each remote capability as one
//! method: create a storage, refresh its token, read, write and delete keys,
//! wipe it, and create, list and restore backups.
//!
//! # Features
//! - HTTP/1.1 and HTTP/2 over plaintext or TLS (rustls)
//! - Optional certificate pinning
//! - Errors propagate as [`Error`], classified by [`ErrorKind`]
//! - Session shared safely between clones and tasks
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use online_storage::{Client, CreateOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), online_storage::Error> {
//!     let client = Client::new()?;
//!     client.create(CreateOptions::new().domain("example.com")).await?;
//!
//!     // Store a value
//!     client.set(&json!({"greeting": "Hello, World!"})).await?;
//!
//!     // Retrieve a value
//!     let value = client.get("greeting").await?;
//!     println!("Retrieved: {}", value);
//!
//!     // Snapshot everything
//!     let backup = client.backup().await?;
//!     println!("Backup: {}", backup);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
mod session;
mod tls;
pub mod types;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
pub use session::{DEFAULT_HOST, PASSWORD_HEADER};
pub use types::*;
