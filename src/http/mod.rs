//! HTTP client setup for the default transfer backend.
//!
//! - [`client`] - client creation with tracing and transient-retry middleware
//!
//! The middleware retries only transient failures (connection resets, 5xx,
//! 429) inside a single chunk attempt. The chunk-level retry budget of the
//! content manager sits on top of it, so the default here is a single retry.
//!
//! # Examples
//!
//! ```rust
//! use dtg::http::{create_http_client, HttpClientConfig};
//! use reqwest::header::{HeaderMap, USER_AGENT};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut headers = HeaderMap::new();
//! headers.insert(USER_AGENT, "MyPlayer/1.0".parse()?);
//!
//! let config = HttpClientConfig {
//!     retries: 2,
//!     proxy: None,
//!     headers: Some(headers),
//!     timeout: Some(Duration::from_secs(30)),
//! };
//!
//! let client = create_http_client(config)?;
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{create_http_client, HttpClientConfig};
