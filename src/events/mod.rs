//! Item event notification.
//!
//! The host application registers one [`ItemDelegate`] per
//! [`ContentManager`](crate::ContentManager). The engine collects
//! [`Notice`]s while it holds an item's lock and hands them to the
//! [`EventNotifier`] once the lock is released, so a delegate may safely call
//! back into the manager.
//!
//! # Examples
//!
//! ```rust
//! use dtg::{Error, ItemDelegate, ItemState};
//!
//! struct Printer;
//!
//! impl ItemDelegate for Printer {
//!     fn on_error(&self, id: &str, error: &Error) {
//!         eprintln!("{} failed: {}", id, error);
//!     }
//!
//!     fn on_progress(&self, id: &str, downloaded: u64, estimated: Option<u64>) {
//!         println!("{}: {}/{:?}", id, downloaded, estimated);
//!     }
//!
//!     fn on_state_changed(&self, id: &str, state: ItemState) {
//!         println!("{} is now {}", id, state);
//!     }
//! }
//! ```

use crate::error::Error;
use crate::item::ItemState;

use parking_lot::RwLock;
use std::sync::Arc;

/// Receives item events.
pub trait ItemDelegate: Send + Sync {
    /// Item download has failed.
    fn on_error(&self, id: &str, error: &Error);

    /// Some data was downloaded for the item.
    fn on_progress(&self, id: &str, downloaded: u64, estimated: Option<u64>);

    /// Item has changed state.
    fn on_state_changed(&self, id: &str, state: ItemState);
}

/// An event waiting to be delivered.
#[derive(Debug)]
pub(crate) enum Notice {
    Error {
        id: String,
        error: Error,
    },
    Progress {
        id: String,
        downloaded: u64,
        estimated: Option<u64>,
    },
    StateChanged {
        id: String,
        state: ItemState,
    },
}

impl Notice {
    pub(crate) fn error(id: &str, error: Error) -> Self {
        Notice::Error {
            id: id.to_string(),
            error,
        }
    }

    pub(crate) fn state(id: &str, state: ItemState) -> Self {
        Notice::StateChanged {
            id: id.to_string(),
            state,
        }
    }
}

/// Forwards notices to the registered delegate.
#[derive(Default)]
pub(crate) struct EventNotifier {
    delegate: RwLock<Option<Arc<dyn ItemDelegate>>>,
}

impl EventNotifier {
    pub(crate) fn new(delegate: Option<Arc<dyn ItemDelegate>>) -> Self {
        Self {
            delegate: RwLock::new(delegate),
        }
    }

    pub(crate) fn set_delegate(&self, delegate: Option<Arc<dyn ItemDelegate>>) {
        *self.delegate.write() = delegate;
    }

    pub(crate) fn has_delegate(&self) -> bool {
        self.delegate.read().is_some()
    }

    pub(crate) fn emit(&self, notice: Notice) {
        // Clone out so the delegate may replace itself from a callback.
        let Some(delegate) = self.delegate.read().clone() else {
            return;
        };
        match notice {
            Notice::Error { id, error } => delegate.on_error(&id, &error),
            Notice::Progress {
                id,
                downloaded,
                estimated,
            } => delegate.on_progress(&id, downloaded, estimated),
            Notice::StateChanged { id, state } => delegate.on_state_changed(&id, state),
        }
    }

    pub(crate) fn emit_all(&self, notices: Vec<Notice>) {
        for notice in notices {
            self.emit(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl ItemDelegate for Log {
        fn on_error(&self, id: &str, error: &Error) {
            self.0.lock().push(format!("error {} {}", id, error));
        }

        fn on_progress(&self, id: &str, downloaded: u64, estimated: Option<u64>) {
            self.0
                .lock()
                .push(format!("progress {} {} {:?}", id, downloaded, estimated));
        }

        fn on_state_changed(&self, id: &str, state: ItemState) {
            self.0.lock().push(format!("state {} {}", id, state));
        }
    }

    #[test]
    fn test_emit_in_order() {
        let log = Arc::new(Log::default());
        let notifier = EventNotifier::new(Some(log.clone()));
        notifier.emit_all(vec![
            Notice::state("a", ItemState::InProgress),
            Notice::Progress {
                id: "a".into(),
                downloaded: 5,
                estimated: Some(10),
            },
            Notice::error("a", Error::NotStarted),
        ]);

        assert_eq!(
            *log.0.lock(),
            vec![
                "state a inProgress".to_string(),
                "progress a 5 Some(10)".to_string(),
                "error a the content manager is not started".to_string(),
            ]
        );
    }

    #[test]
    fn test_emit_without_delegate() {
        let notifier = EventNotifier::default();
        assert!(!notifier.has_delegate());
        notifier.emit(Notice::state("a", ItemState::Paused));
    }
}
