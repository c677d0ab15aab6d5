//! Shared utility functions.
//!
//! This module contains utility functions that are used across multiple
//! modules in the dtg crate.
//!
//! - [`content_length`] - Content length extraction from HTTP responses
//! - [`paths`] - On-disk layout of records and chunk files
//!
//! # Examples
//!
//! ```rust
//! use dtg::utils::{parse_content_range_total, paths::encode_segment};
//!
//! assert_eq!(parse_content_range_total("bytes 0-1023/2048"), Some(2048));
//! assert_eq!(encode_segment("show/episode 1"), "show%2Fepisode+1");
//! ```

pub mod content_length;
pub mod paths;

pub use content_length::{extract_content_length, get_content_length, parse_content_range_total};
