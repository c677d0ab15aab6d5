//! Item module containing the item model and the item registry.
//!
//! - [`model`] - [`Item`], [`Track`] and [`ItemState`]
//! - `registry` - the id-keyed registry owning every item record

pub mod model;
pub(crate) mod registry;

pub use model::{Item, ItemState, Track};
