//! HTTP client setup and middleware configuration.

use reqwest::{header::HeaderMap, Proxy};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use reqwest_tracing::TracingMiddleware;
use std::time::Duration;

/// Configuration for HTTP client setup.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Number of transient retries within one chunk attempt.
    pub retries: u32,
    /// Optional proxy configuration.
    pub proxy: Option<Proxy>,
    /// Default headers to include with all requests.
    pub headers: Option<HeaderMap>,
    /// Total timeout of a single request, body included.
    pub timeout: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            proxy: None,
            headers: None,
            timeout: None,
        }
    }
}

/// Creates an HTTP client with tracing and retry middleware.
///
/// ```rust
/// use dtg::http::client::{create_http_client, HttpClientConfig};
///
/// let client = create_http_client(HttpClientConfig::default()).unwrap();
/// ```
pub fn create_http_client(
    config: HttpClientConfig,
) -> Result<ClientWithMiddleware, reqwest::Error> {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.retries);

    let mut inner_client_builder = reqwest::Client::builder();
    if let Some(proxy) = config.proxy {
        inner_client_builder = inner_client_builder.proxy(proxy);
    }
    if let Some(headers) = config.headers {
        inner_client_builder = inner_client_builder.default_headers(headers);
    }
    if let Some(timeout) = config.timeout {
        inner_client_builder = inner_client_builder.timeout(timeout);
    }
    let inner_client = inner_client_builder.build()?;

    let client = ClientBuilder::new(inner_client)
        // Trace HTTP requests. See the tracing crate to make use of these traces.
        .with(TracingMiddleware::default())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    Ok(client)
}
