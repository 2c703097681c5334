//! Media items: the attachments (image, video, audio, text) held by a frame.
//!
//! A media item is owned by exactly one frame (its root frame). When
//! `span_frames` is set, following frames reference it through a
//! [`MediaLink`] instead of holding a copy.
//!
//! Duration encoding (milliseconds):
//! - `-1` - unset
//! - `> 0` - explicit value (recorded audio length, or a user override)
//! - `< -1` - text only: auto-computed value stored negated, so it can be told
//!   apart from a user override. Read it back with [`MediaItem::auto_text_duration`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel for a duration that was never set.
pub const DURATION_UNSET: i32 = -1;

/// Kind of media attachment.
///
/// Discriminants match the on-disk type codes and define resolution order:
/// a frame's media are listed by type first, then by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MediaType {
    ImageBack = 1,
    ImageFront = 2,
    Video = 3,
    Audio = 4,
    Text = 5,
}

impl MediaType {
    /// Image or video: occupies the frame's single visual slot.
    pub fn is_visual(self) -> bool {
        matches!(self, MediaType::ImageBack | MediaType::ImageFront | MediaType::Video)
    }

    /// Slot used for the per-frame "one item per type" rule.
    /// All visual types share one slot.
    pub fn slot(self) -> MediaType {
        if self.is_visual() { MediaType::ImageBack } else { self }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaType::ImageBack | MediaType::ImageFront => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Text => "text",
        }
    }
}

/// One attachment belonging to a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: Uuid,
    /// Root frame (owner). Frames that only link to the item are not recorded here.
    pub parent_frame_id: Uuid,
    pub media_type: MediaType,
    pub file_path: PathBuf,
    #[serde(default = "default_duration")]
    pub duration_ms: i32,
    #[serde(default)]
    pub span_frames: bool,
    #[serde(default)]
    pub deleted: bool,
    /// Creation time, ms since UNIX epoch. Secondary sort key after type.
    #[serde(default)]
    pub created_ms: i64,
}

fn default_duration() -> i32 {
    DURATION_UNSET
}

impl MediaItem {
    pub fn new(parent_frame_id: Uuid, media_type: MediaType, file_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_frame_id,
            media_type,
            file_path: file_path.into(),
            duration_ms: DURATION_UNSET,
            span_frames: false,
            deleted: false,
            created_ms: now_ms(),
        }
    }

    pub fn with_duration(mut self, duration_ms: i32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn spanning(mut self, span_frames: bool) -> Self {
        self.span_frames = span_frames;
        self
    }

    /// Explicit (user-set or measured) duration, if any.
    pub fn explicit_duration(&self) -> Option<i32> {
        (self.duration_ms > 0).then_some(self.duration_ms)
    }

    /// Auto-computed text duration stored negated, surfaced as a positive value.
    pub fn auto_text_duration(&self) -> Option<i32> {
        if self.media_type == MediaType::Text && self.duration_ms < DURATION_UNSET {
            Some(self.duration_ms.saturating_abs())
        } else {
            None
        }
    }

    /// True when `frame_id` is the item's owner rather than a linking frame.
    pub fn is_root(&self, frame_id: Uuid) -> bool {
        self.parent_frame_id == frame_id
    }
}

/// Link from a later frame to spanning media owned by an earlier frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLink {
    pub frame_id: Uuid,
    pub media_id: Uuid,
    #[serde(default)]
    pub deleted: bool,
}

impl MediaLink {
    pub fn new(frame_id: Uuid, media_id: Uuid) -> Self {
        Self { frame_id, media_id, deleted: false }
    }
}

/// Display duration of a text: `word_duration_ms` per word, 0 when empty.
pub fn text_duration_ms(text: &str, word_duration_ms: i32) -> i32 {
    let words = text.split_whitespace().count() as i32;
    words.saturating_mul(word_duration_ms)
}

/// Milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
