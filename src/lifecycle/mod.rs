//! Item lifecycle: the transition table and the state machine applying it.
//!
//! ```text
//! new -> metadataLoaded -> inProgress <-> paused
//!                          inProgress | paused -> completed | failed
//!                          failed -> inProgress
//! any -> removed
//! ```
//!
//! [`can_transition`] is the single source of truth for legality.

pub(crate) mod machine;

pub(crate) use machine::StateMachine;

use crate::item::ItemState;

/// Returns `true` if an item may move from `from` to `to`.
pub fn can_transition(from: ItemState, to: ItemState) -> bool {
    use ItemState::*;

    matches!(
        (from, to),
        (New, MetadataLoaded)
            | (MetadataLoaded, InProgress)
            | (InProgress, Paused)
            | (InProgress, Completed)
            | (InProgress, Failed)
            | (Paused, InProgress)
            | (Paused, Completed)
            | (Paused, Failed)
            | (Failed, InProgress)
            | (_, Removed)
    )
}
