//! COMME - narrative timeline library
//!
//! Narratives are ordered frames of images, text and audio. The library
//! stores them and flattens a narrative into either a per-frame export list
//! or an absolute-time playback schedule.

// Timeline engine (snapshots, export and playback flatteners, batch)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;

// Re-export commonly used types from core
pub use crate::core::{content_list, flatten_all, playback_content, ExportFrame, NarrativeSnapshot, PlaybackTimeline};

// Re-export entities
pub use crate::config::TimingConfig;
pub use crate::entities::{Frame, MediaItem, MediaType, Narrative, Store, StoreError};
