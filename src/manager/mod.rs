//! Content manager module.
//!
//! - `manager` - the [`ContentManager`] facade applications talk to
//! - [`builder`] - [`ContentManagerBuilder`] wiring the collaborators together
//! - [`config`] - [`ManagerConfig`] and its defaults
//! - `engine` - shared state and the transfer completion path
//!
//! # Item lifecycle
//!
//! ```text
//! add_item          -> new
//! load_item_metadata-> metadataLoaded
//! start_item        -> inProgress  <-> paused (pause_item / start_item)
//! last chunk done   -> completed
//! retries exhausted -> failed      -> inProgress (start_item)
//! remove_item       -> removed (from any state)
//! ```

pub mod builder;
pub mod config;
pub(crate) mod engine;
mod manager;

pub use builder::ContentManagerBuilder;
pub use config::ManagerConfig;
pub use manager::ContentManager;
