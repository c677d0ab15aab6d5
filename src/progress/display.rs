//! Terminal progress display driven by item events.

use crate::error::Error;
use crate::events::ItemDelegate;
use crate::item::ItemState;
use crate::progress::StyleOptions;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// An [`ItemDelegate`] rendering one progress bar per downloading item.
///
/// The overall bar counts the items that reached `completed`. Events can be
/// forwarded to another delegate, so the display can sit in front of the
/// application's own handler.
///
/// ```rust,no_run
/// use dtg::progress::{ProgressDelegate, StyleOptions};
/// use std::sync::Arc;
///
/// # fn example(builder: dtg::ContentManagerBuilder) -> dtg::Result<()> {
/// let display = Arc::new(ProgressDelegate::new(StyleOptions::default()));
/// let manager = builder.delegate(display.clone()).build()?;
/// # Ok(())
/// # }
/// ```
pub struct ProgressDelegate {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: Mutex<HashMap<String, ProgressBar>>,
    style_options: StyleOptions,
    forward: Option<Arc<dyn ItemDelegate>>,
}

impl ProgressDelegate {
    /// Create a new progress display.
    pub fn new(style_options: StyleOptions) -> Self {
        let multi = match style_options.is_enabled() {
            true => MultiProgress::new(),
            false => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };
        let overall = multi.add(style_options.overall().to_progress_bar(0));

        Self {
            multi,
            overall,
            bars: Mutex::new(HashMap::new()),
            style_options,
            forward: None,
        }
    }

    /// Forward every event to `delegate` after rendering it.
    pub fn with_forward(mut self, delegate: Arc<dyn ItemDelegate>) -> Self {
        self.forward = Some(delegate);
        self
    }

    /// Get the multi-progress instance the bars are drawn in.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }

    /// Get the overall progress bar.
    pub fn overall(&self) -> &ProgressBar {
        &self.overall
    }

    /// The bar of an item, while it is displayed.
    pub fn item_bar(&self, id: &str) -> Option<ProgressBar> {
        self.bars.lock().get(id).cloned()
    }

    /// Finish the overall bar, clearing or keeping it based on configuration.
    pub fn finish(&self) {
        if self.style_options.overall().clear {
            self.overall.finish_and_clear();
        } else {
            self.overall.finish();
        }
    }

    fn bar(&self, id: &str) -> ProgressBar {
        let mut bars = self.bars.lock();
        if let Some(bar) = bars.get(id) {
            return bar.clone();
        }
        let bar = self
            .multi
            .add(self.style_options.item().to_progress_bar(0));
        bar.set_message(id.to_string());
        self.overall.inc_length(1);
        bars.insert(id.to_string(), bar.clone());
        bar
    }

    fn take_bar(&self, id: &str) -> Option<ProgressBar> {
        self.bars.lock().remove(id)
    }

    fn forget_item(&self) {
        let length = self.overall.length().unwrap_or(0);
        self.overall.set_length(length.saturating_sub(1));
    }
}

impl ItemDelegate for ProgressDelegate {
    fn on_error(&self, id: &str, error: &Error) {
        if self.style_options.is_enabled() {
            if let Err(e) = self.multi.println(format!("{}: {}", id, error)) {
                debug!("Cannot print error of item {}: {}", id, e);
            }
        }
        if let Some(forward) = &self.forward {
            forward.on_error(id, error);
        }
    }

    fn on_progress(&self, id: &str, downloaded: u64, estimated: Option<u64>) {
        let bar = self.bar(id);
        bar.set_length(estimated.unwrap_or(downloaded).max(downloaded));
        bar.set_position(downloaded);
        if let Some(forward) = &self.forward {
            forward.on_progress(id, downloaded, estimated);
        }
    }

    fn on_state_changed(&self, id: &str, state: ItemState) {
        match state {
            ItemState::InProgress => {
                self.bar(id).set_message(id.to_string());
            }
            ItemState::Paused => {
                self.bar(id).set_message(format!("{} (paused)", id));
            }
            ItemState::Completed => {
                match self.take_bar(id) {
                    Some(bar) if self.style_options.item().clear => bar.finish_and_clear(),
                    Some(bar) => bar.finish(),
                    // Items without chunks complete without any progress.
                    None => self.overall.inc_length(1),
                }
                self.overall.inc(1);
            }
            ItemState::Failed => {
                if let Some(bar) = self.take_bar(id) {
                    bar.abandon_with_message(format!("{} failed", id));
                    self.forget_item();
                }
            }
            ItemState::Removed => {
                if let Some(bar) = self.take_bar(id) {
                    bar.finish_and_clear();
                    self.forget_item();
                }
            }
            ItemState::New | ItemState::MetadataLoaded => {}
        }
        if let Some(forward) = &self.forward {
            forward.on_state_changed(id, state);
        }
    }
}

