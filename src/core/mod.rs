//! Timeline engine: snapshots and the two flatteners.
//!
//! Everything here works on value-typed [`NarrativeSnapshot`]s, independent
//! of how the store is held.

pub mod batch;
pub mod export;
pub mod holder;
pub mod playback;
pub mod snapshot;

// Re-exports for convenience
pub use batch::{export_all, flatten_all, FlattenedNarrative};
pub use export::{content_list, total_duration, ExportAudio, ExportFrame};
pub use holder::{PlaybackMediaHolder, TERMINAL_OFFSET};
pub use playback::{playback_content, PlaybackTimeline};
pub use snapshot::{FrameContent, NarrativeSnapshot, ResolvedMedia};
