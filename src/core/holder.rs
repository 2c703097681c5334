//! Timed media entry produced by playback flattening.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::MediaType;

/// Offset meaning "keep visible for 1ms past the nominal end".
pub const TERMINAL_OFFSET: i32 = -1;

/// One media item scheduled at absolute narrative times (ms).
///
/// Offsets let the renderer start a crossfade early: the effective start is
/// `start - offset_start` and the effective end is `end - offset_end`.
/// Holders are not edited in place; extending one produces a new holder that
/// replaces the old one at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackMediaHolder {
    pub parent_frame_id: Uuid,
    /// Every frame this holder covers, starting with `parent_frame_id`.
    pub spanning_frame_ids: Vec<Uuid>,
    pub media_item_id: Uuid,
    pub path: PathBuf,
    pub media_type: MediaType,
    start_ms: i32,
    end_ms: i32,
    playback_offset_start: i32,
    playback_offset_end: i32,
    original_duration: i32,
}

impl PlaybackMediaHolder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_frame_id: Uuid,
        media_item_id: Uuid,
        path: PathBuf,
        media_type: MediaType,
        start_ms: i32,
        end_ms: i32,
        playback_offset_start: i32,
        playback_offset_end: i32,
    ) -> Self {
        Self {
            parent_frame_id,
            spanning_frame_ids: vec![parent_frame_id],
            media_item_id,
            path,
            media_type,
            start_ms,
            end_ms,
            playback_offset_start,
            playback_offset_end,
            original_duration: end_ms.saturating_sub(start_ms),
        }
    }

    /// Add frames that link to this item (spanning audio).
    pub fn with_linked_frames(mut self, frames: impl IntoIterator<Item = Uuid>) -> Self {
        self.spanning_frame_ids.extend(frames);
        self
    }

    /// Copy with a new end time and offsets, optionally covering one more frame.
    pub fn extended(&self, spanned_frame: Option<Uuid>, end_ms: i32, offset_start: i32, offset_end: i32) -> Self {
        let mut next = self.clone();
        next.end_ms = end_ms;
        next.playback_offset_start = offset_start;
        next.playback_offset_end = offset_end;
        if let Some(frame) = spanned_frame {
            next.spanning_frame_ids.push(frame);
        }
        next
    }

    /// Copy with new offsets only.
    pub fn with_offsets(&self, offset_start: i32, offset_end: i32) -> Self {
        self.extended(None, self.end_ms, offset_start, offset_end)
    }

    pub fn start_time(&self, include_playback_offset: bool) -> i32 {
        if include_playback_offset { self.start_ms.saturating_sub(self.playback_offset_start) } else { self.start_ms }
    }

    pub fn end_time(&self, include_playback_offset: bool) -> i32 {
        if include_playback_offset { self.end_ms.saturating_sub(self.playback_offset_end) } else { self.end_ms }
    }

    pub fn playback_offsets(&self) -> (i32, i32) {
        (self.playback_offset_start, self.playback_offset_end)
    }

    pub fn duration(&self) -> i32 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn has_changed_duration(&self) -> bool {
        self.duration() != self.original_duration
    }

    /// Drop crossfade offsets, keeping the 1ms visibility tweaks.
    pub fn remove_playback_offsets(&mut self) {
        if self.playback_offset_start.abs() != 1 {
            self.playback_offset_start = 0;
        }
        if self.playback_offset_end.abs() != 1 {
            self.playback_offset_end = 0;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.playback_offset_end == TERMINAL_OFFSET
    }
}

impl std::fmt::Display for PlaybackMediaHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}..{} ({:+}/{:+}) media={} frames={}",
            self.media_type.label(),
            self.start_ms,
            self.end_ms,
            self.playback_offset_start,
            self.playback_offset_end,
            self.media_item_id,
            self.spanning_frame_ids.len()
        )
    }
}
