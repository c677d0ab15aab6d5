//! Progress bar styling and configuration options.
//!
//! The overall bar counts finished items; each item gets a byte bar of its
//! own while it downloads.
//!
//! ```rust
//! use dtg::progress::{ProgressBarOpts, StyleOptions};
//!
//! let quiet = StyleOptions::new(ProgressBarOpts::hidden(), ProgressBarOpts::with_pip_style());
//! assert!(quiet.is_enabled());
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

/// Define the progress display style options.
///
/// By default, the overall bar stays on the screen upon completion, but the
/// item bars are cleared once their item completes.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    /// Style options for the overall progress bar.
    pub(crate) overall: ProgressBarOpts,
    /// Style options for the per-item progress bars.
    pub(crate) item: ProgressBarOpts,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            overall: ProgressBarOpts {
                template: Some(ProgressBarOpts::TEMPLATE_BAR_WITH_POSITION.into()),
                progress_chars: Some(ProgressBarOpts::CHARS_FINE.into()),
                enabled: true,
                clear: false,
            },
            item: ProgressBarOpts::with_pip_style(),
        }
    }
}

impl StyleOptions {
    /// Create new [`StyleOptions`].
    pub fn new(overall: ProgressBarOpts, item: ProgressBarOpts) -> Self {
        Self { overall, item }
    }

    /// Style options hiding every bar.
    pub fn hidden() -> Self {
        Self::new(ProgressBarOpts::hidden(), ProgressBarOpts::hidden())
    }

    /// Set the options for the overall progress bar.
    pub fn set_overall(&mut self, overall: ProgressBarOpts) {
        self.overall = overall;
    }

    /// Set the options for the item progress bars.
    pub fn set_item(&mut self, item: ProgressBarOpts) {
        self.item = item;
    }

    /// Return `false` if neither the overall nor the item bars are enabled.
    pub fn is_enabled(&self) -> bool {
        self.overall.enabled || self.item.enabled
    }

    /// Get a reference to the overall progress bar options.
    pub fn overall(&self) -> &ProgressBarOpts {
        &self.overall
    }

    /// Get a reference to the item progress bar options.
    pub fn item(&self) -> &ProgressBarOpts {
        &self.item
    }
}

/// Define the options for a progress bar.
#[derive(Debug, Clone)]
pub struct ProgressBarOpts {
    /// Progress bar template string.
    template: Option<String>,
    /// Progression characters set.
    ///
    /// There must be at least 3 characters for the following states:
    /// "filled", "current", and "to do".
    progress_chars: Option<String>,
    /// Enable or disable the progress bar.
    pub(crate) enabled: bool,
    /// Clear the progress bar once completed.
    pub(crate) clear: bool,
}

impl Default for ProgressBarOpts {
    fn default() -> Self {
        Self {
            template: None,
            progress_chars: None,
            enabled: true,
            clear: true,
        }
    }
}

impl ProgressBarOpts {
    /// Template representing the bar and its position.
    ///
    ///`███████████████████████████████████████ 11/12 (99%) eta 00:00:02`
    pub const TEMPLATE_BAR_WITH_POSITION: &'static str =
        "{bar:40.blue} {pos:>}/{len} ({percent}%) eta {eta_precise:.blue}";
    /// Template which looks like the Python package installer pip, prefixed
    /// with the item id.
    ///
    /// `movie ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━ 211.23 KiB/1.02 MiB 1008.31 KiB/s eta 1s`
    pub const TEMPLATE_PIP: &'static str =
        "{msg} {bar:40.green/black} {bytes:>11.green}/{total_bytes:<11.green} {bytes_per_sec:>13.red} eta {eta:.blue}";
    /// Use fine blocks as progress characters: `"█▉▊▋▌▍▎▏  "`.
    pub const CHARS_FINE: &'static str = "█▉▊▋▌▍▎▏  ";
    /// Use a line as progress characters: `"━╾─"`.
    pub const CHARS_LINE: &'static str = "━╾╴─";
    /// Use rough blocks as progress characters: `"█  "`.
    pub const CHARS_ROUGH: &'static str = "█  ";

    /// Create a new [`ProgressBarOpts`].
    pub fn new(
        template: Option<String>,
        progress_chars: Option<String>,
        enabled: bool,
        clear: bool,
    ) -> Self {
        Self {
            template,
            progress_chars,
            enabled,
            clear,
        }
    }

    /// Create a [`ProgressStyle`] based on the provided options.
    ///
    /// An invalid template falls back to the default bar.
    pub fn to_progress_style(&self) -> ProgressStyle {
        let mut style = ProgressStyle::default_bar();
        if let Some(template) = &self.template {
            match ProgressStyle::default_bar().template(template) {
                Ok(templated) => style = templated,
                Err(e) => warn!("Ignoring progress template {:?}: {}", template, e),
            }
        }
        if let Some(progress_chars) = &self.progress_chars {
            style = style.progress_chars(progress_chars);
        }
        style
    }

    /// Create a [`ProgressBar`] based on the provided options.
    pub fn to_progress_bar(&self, len: u64) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        ProgressBar::new(len).with_style(self.to_progress_style())
    }

    /// Create a new [`ProgressBarOpts`] which looks like Python pip.
    pub fn with_pip_style() -> Self {
        Self {
            template: Some(ProgressBarOpts::TEMPLATE_PIP.into()),
            progress_chars: Some(ProgressBarOpts::CHARS_LINE.into()),
            enabled: true,
            clear: true,
        }
    }

    /// Set to `true` to clear the progress bar upon completion.
    pub fn set_clear(&mut self, clear: bool) {
        self.clear = clear;
    }

    /// Create a new [`ProgressBarOpts`] which hides the progress bars.
    pub fn hidden() -> Self {
        Self {
            enabled: false,
            ..ProgressBarOpts::default()
        }
    }
}
