//! Progress module rendering item events as terminal progress bars.
//!
//! - `style` - progress bar styling options and templates
//! - `display` - [`ProgressDelegate`], an [`ItemDelegate`](crate::ItemDelegate)
//!   drawing the bars
//!
//! # Examples
//!
//! ```rust
//! use dtg::progress::{ProgressBarOpts, ProgressDelegate, StyleOptions};
//!
//! let style_options = StyleOptions::new(
//!     ProgressBarOpts::new(
//!         Some("[{bar:40.cyan/blue}] {pos}/{len} {msg}".to_string()),
//!         Some("█▉▊▋▌▍▎▏  ".to_string()),
//!         true,
//!         false
//!     ),
//!     ProgressBarOpts::with_pip_style(),
//! );
//! let display = ProgressDelegate::new(style_options);
//! assert_eq!(display.overall().length(), Some(0));
//! ```

pub(crate) mod display;
pub(crate) mod style;

pub use display::ProgressDelegate;
pub use style::{ProgressBarOpts, StyleOptions};
