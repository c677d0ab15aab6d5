//! Chunk scheduler module.
//!
//! - `scheduler` - the bounded, round-robin chunk dispatcher
//! - [`retry`] - the per-chunk retry budget and backoff
//!
//! # Examples
//!
//! ```rust
//! use dtg::scheduler::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     max_retries: 2,
//!     backoff: Duration::from_millis(250),
//!     max_backoff: Duration::from_secs(5),
//! };
//! assert_eq!(policy.delay(2), Duration::from_millis(500));
//! assert!(!policy.should_retry(3));
//! ```

pub mod retry;
pub(crate) mod scheduler;

pub use retry::RetryPolicy;
pub(crate) use scheduler::{Claim, Scheduler};
