//! Entities: narratives, frames, media items and the store that owns them.
//!
//! A narrative is an ordered list of frames. Each frame owns its media items;
//! spanning items are shared with following frames through [`MediaLink`]s.

pub mod frame;
pub mod media;
pub mod narrative;
pub mod store;

pub use frame::Frame;
pub use media::{now_ms, text_duration_ms, MediaItem, MediaLink, MediaType, DURATION_UNSET};
pub use narrative::{Narrative, NarrativeKind};
pub use store::{Store, StoreError, SweepReport};
