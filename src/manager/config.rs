//! Content manager configuration.
//!
//! [`ManagerConfig`] holds every setting of a [`ContentManager`](crate::ContentManager).
//! It is populated through the
//! [`ContentManagerBuilder`](crate::manager::ContentManagerBuilder) and is
//! fixed once the manager is built.
//!
//! ```rust
//! use dtg::manager::ManagerConfig;
//!
//! let config = ManagerConfig::default();
//! assert_eq!(config.max_concurrent_downloads, 4);
//! assert_eq!(config.max_retries, 3);
//! ```

use crate::http::HttpClientConfig;
use crate::scheduler::RetryPolicy;

use std::env::current_dir;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure for the content manager.
#[derive(Clone)]
pub struct ManagerConfig {
    /// Root directory of the chunk files and of the default record store.
    pub storage_path: PathBuf,
    /// Maximum number of chunks transferring at once, across all items.
    /// Must be at least 1.
    pub max_concurrent_downloads: usize,
    /// Number of retries of a failed chunk before its item fails.
    pub max_retries: u32,
    /// Delay before the first retry of a chunk. Doubles on every retry.
    pub retry_backoff: Duration,
    /// Upper bound of the retry delay.
    pub max_retry_backoff: Duration,
    /// HTTP client settings of the default transfer backend.
    pub http: HttpClientConfig,
}

impl ManagerConfig {
    /// The retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
            max_backoff: self.max_retry_backoff,
        }
    }
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("storage_path", &self.storage_path)
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("max_retry_backoff", &self.max_retry_backoff)
            .field("http_retries", &self.http.retries)
            .field("http_proxy", &self.http.proxy.is_some())
            .field("http_headers", &self.http.headers)
            .finish()
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            storage_path: current_dir().unwrap_or_default().join("downloads"),
            max_concurrent_downloads: 4,
            max_retries: retry.max_retries,
            retry_backoff: retry.backoff,
            max_retry_backoff: retry.max_backoff,
            http: HttpClientConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let policy = ManagerConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_debug_hides_proxy() {
        let debug = format!("{:?}", ManagerConfig::default());
        assert!(debug.contains("max_concurrent_downloads: 4"));
        assert!(debug.contains("http_proxy: false"));
    }
}
