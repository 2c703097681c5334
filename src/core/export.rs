//! Export flattening: one compacted record per frame.
//!
//! Unlike playback, export has no notion of items starting or ending
//! mid-narrative. Spanning images and text are repeated on every frame they
//! reach; spanning audio is listed on each frame and its length is shared
//! out between them so each frame gets a duration.
//!
//! Frame duration rules:
//! - explicit durations (`> 0`) of image, video, text and non-spanning audio
//!   raise `frame_max_duration`
//! - a frame carrying spanning audio and no explicit duration gets an equal
//!   share of the audio: `ceil(remaining / frames)`, where `remaining` is the
//!   audio length minus what frames with explicit durations already took
//! - a frame with neither gets `max(auto text duration, min_frame_duration)`

use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::{FrameContent, NarrativeSnapshot};
use crate::config::TimingConfig;
use crate::entities::{text_duration_ms, MediaType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportAudio {
    pub path: PathBuf,
    pub duration_ms: i32,
}

/// Compacted export view of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFrame {
    pub frame_id: Uuid,
    pub narrative_id: Uuid,
    pub sequence_id: i32,
    pub image_path: Option<PathBuf>,
    pub image_is_front_camera: bool,
    pub text_content: Option<String>,
    pub audio: Vec<ExportAudio>,
    /// Index into `audio` of the spanning item, if one applies to this frame.
    pub spanning_audio_index: Option<usize>,
    /// True on the frame that owns the spanning audio.
    pub spanning_audio_root: bool,
    pub frame_max_duration: i32,
}

impl ExportFrame {
    fn new(content: &FrameContent) -> Self {
        Self {
            frame_id: content.frame.id,
            narrative_id: content.frame.narrative_id,
            sequence_id: content.frame.sequence_id,
            image_path: None,
            image_is_front_camera: false,
            text_content: None,
            audio: Vec::new(),
            spanning_audio_index: None,
            spanning_audio_root: false,
            frame_max_duration: 0,
        }
    }

    fn update_frame_max_duration(&mut self, duration_ms: i32) {
        self.frame_max_duration = self.frame_max_duration.max(duration_ms);
    }

    /// Append an audio file. Returns its index, or `None` when the path is
    /// already listed or the frame is full.
    fn add_audio(&mut self, path: PathBuf, duration_ms: i32, max_items: usize) -> Option<usize> {
        if self.audio.len() >= max_items || self.audio.iter().any(|a| a.path == path) {
            return None;
        }
        self.audio.push(ExportAudio { path, duration_ms });
        Some(self.audio.len() - 1)
    }

    pub fn has_duration(&self) -> bool {
        self.frame_max_duration > 0
    }
}

/// Per spanning-audio bookkeeping: frames still to share, time left to share.
#[derive(Debug, Default, Clone, Copy)]
struct SpanShare {
    frames: i32,
    remaining: i32,
}

impl SpanShare {
    /// Equal share for each frame, rounded up so the total never falls short.
    fn per_frame(self) -> i32 {
        if self.frames <= 0 {
            return 0;
        }
        let remaining = self.remaining.max(0);
        remaining / self.frames + i32::from(remaining % self.frames != 0)
    }
}

/// Flatten a narrative into per-frame export records.
pub fn content_list(snapshot: &NarrativeSnapshot, config: &TimingConfig) -> Vec<ExportFrame> {
    let mut exported = Vec::with_capacity(snapshot.frames.len());
    let mut spans: HashMap<Uuid, SpanShare> = HashMap::new();
    // spanning audio id per exported frame (same index as `exported`)
    let mut frame_spans: Vec<Option<Uuid>> = Vec::with_capacity(snapshot.frames.len());
    // auto text durations, used only as a floor candidate
    let mut auto_text: Vec<i32> = Vec::with_capacity(snapshot.frames.len());

    for content in &snapshot.frames {
        let frame_id = content.id();
        let mut container = ExportFrame::new(content);
        let mut spanning_audio = None;
        let mut text_auto = 0;

        for media in &content.media {
            let item = &media.item;
            match item.media_type {
                MediaType::ImageFront | MediaType::ImageBack | MediaType::Video => {
                    container.image_is_front_camera = item.media_type == MediaType::ImageFront;
                    container.image_path = Some(item.file_path.clone());
                    if let Some(d) = item.explicit_duration() {
                        container.update_frame_max_duration(d);
                    }
                }
                MediaType::Text => {
                    container.text_content = media.text.clone().filter(|t| !t.trim().is_empty());
                    if let Some(d) = item.explicit_duration() {
                        container.update_frame_max_duration(d);
                    }
                    text_auto = item.auto_text_duration().unwrap_or_else(|| {
                        container
                            .text_content
                            .as_deref()
                            .map(|t| text_duration_ms(t, config.word_duration_ms))
                            .unwrap_or(0)
                    });
                }
                MediaType::Audio => {
                    let inserted =
                        container.add_audio(item.file_path.clone(), item.duration_ms, config.max_audio_items);
                    let Some(index) = inserted else {
                        trace!("Frame {}: skipped audio {}", frame_id, item.id);
                        continue;
                    };
                    if item.span_frames {
                        if item.is_root(frame_id) {
                            container.spanning_audio_root = true;
                        }
                        // one spanning audio item per frame
                        container.spanning_audio_index = Some(index);
                        spanning_audio = Some((item.id, item.duration_ms));
                    } else {
                        container.update_frame_max_duration(item.duration_ms);
                    }
                }
            }
        }

        if let Some((audio_id, audio_duration)) = spanning_audio {
            let share = spans
                .entry(audio_id)
                .or_insert(SpanShare { frames: 0, remaining: audio_duration.max(0) });
            if container.has_duration() {
                // this frame already took part of the audio's allowance
                share.remaining = share.remaining.saturating_sub(container.frame_max_duration);
            } else {
                share.frames += 1;
            }
        }

        exported.push(container);
        frame_spans.push(spanning_audio.map(|(id, _)| id));
        auto_text.push(text_auto);
    }

    // second pass: hand out spanning audio shares, then floor the rest
    for ((container, span), text_auto) in exported.iter_mut().zip(frame_spans).zip(auto_text) {
        if container.has_duration() {
            continue;
        }
        if let Some(share) = span.and_then(|id| spans.get(&id)) {
            if share.frames > 0 {
                // zero is allowed here when explicit durations used the whole allowance
                container.frame_max_duration = share.per_frame();
                continue;
            }
        }
        container.frame_max_duration = text_auto.max(config.min_frame_duration_ms);
    }

    debug!(
        "Export flatten: narrative {} -> {} frames, {} spanning audio items",
        snapshot.narrative.id,
        exported.len(),
        spans.len()
    );
    exported
}

/// Sum of all frame durations, saturating at `i32::MAX`.
pub fn total_duration(frames: &[ExportFrame]) -> i32 {
    frames.iter().fold(0i32, |total, f| total.saturating_add(f.frame_max_duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MediaItem, Store};

    fn config() -> TimingConfig {
        TimingConfig::default()
    }

    #[test]
    fn test_empty_narrative() {
        let store = Store::new();
        let n = store.create_narrative();
        let snap = store.snapshot(n).unwrap();
        let frames = content_list(&snap, &config());
        assert!(frames.is_empty());
        assert_eq!(total_duration(&frames), 0);
    }

    #[test]
    fn test_empty_frame_gets_minimum() {
        let store = Store::new();
        let n = store.create_narrative();
        store.add_frame(n).unwrap();
        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_max_duration, 2500);
    }

    #[test]
    fn test_non_spanning_uses_max_duration() {
        let store = Store::new();
        let n = store.create_narrative();
        let f = store.add_frame(n).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::ImageFront, "/m/front.jpg").with_duration(1200)).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::Audio, "/m/a.m4a").with_duration(3100)).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::Audio, "/m/b.m4a").with_duration(900)).unwrap();

        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        let frame = &frames[0];
        assert_eq!(frame.frame_max_duration, 3100);
        assert!(frame.image_is_front_camera);
        assert_eq!(frame.image_path, Some(PathBuf::from("/m/front.jpg")));
        assert_eq!(frame.audio.len(), 2);
        assert_eq!(frame.spanning_audio_index, None);
    }

    #[test]
    fn test_short_explicit_duration_not_floored() {
        let store = Store::new();
        let n = store.create_narrative();
        let f = store.add_frame(n).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::ImageBack, "/m/i.jpg").with_duration(700)).unwrap();
        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames[0].frame_max_duration, 700);
    }

    #[test]
    fn test_spanning_audio_split_with_ceiling() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        store
            .add_media(a, MediaItem::new(a, MediaType::Audio, "/m/long.m4a").with_duration(10_000).spanning(true))
            .unwrap();

        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.frame_max_duration, 3334);
            assert_eq!(frame.spanning_audio_index, Some(0));
        }
        assert!(frames[0].spanning_audio_root);
        assert!(!frames[1].spanning_audio_root);
        assert!(total_duration(&frames) >= 10_000);
    }

    #[test]
    fn test_explicit_duration_consumes_span_allowance() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        store
            .add_media(a, MediaItem::new(a, MediaType::Audio, "/m/long.m4a").with_duration(9000).spanning(true))
            .unwrap();
        store.add_media(b, MediaItem::new(b, MediaType::Text, "/m/t.txt").with_duration(5000)).unwrap();

        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames[1].frame_max_duration, 5000);
        // (9000 - 5000) / 2 frames
        assert_eq!(frames[0].frame_max_duration, 2000);
        assert_eq!(frames[2].frame_max_duration, 2000);
        assert_eq!(total_duration(&frames), 9000);
    }

    #[test]
    fn test_text_auto_duration_floor() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        // auto-computed 4000ms stored negated
        store.add_media(a, MediaItem::new(a, MediaType::Text, "/m/a.txt").with_duration(-4000)).unwrap();
        // short auto value still floored to the minimum
        store.add_media(b, MediaItem::new(b, MediaType::Text, "/m/b.txt").with_duration(-600)).unwrap();

        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames[0].frame_max_duration, 4000);
        assert_eq!(frames[1].frame_max_duration, 2500);
    }

    #[test]
    fn test_text_content_word_duration() {
        let dir = std::env::temp_dir().join(format!("comme_export_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("words.txt");
        let words = vec!["word"; 20].join(" ");
        std::fs::write(&path, &words).unwrap();

        let store = Store::new();
        let n = store.create_narrative();
        let f = store.add_frame(n).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::Text, &path)).unwrap();

        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames[0].text_content.as_deref(), Some(words.as_str()));
        assert_eq!(frames[0].frame_max_duration, 20 * 200);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_per_frame_share_rounds_up() {
        let share = SpanShare { frames: 3, remaining: 10 };
        assert_eq!(share.per_frame(), 4);
        let share = SpanShare { frames: 2, remaining: -50 };
        assert_eq!(share.per_frame(), 0);
        let share = SpanShare { frames: 0, remaining: 100 };
        assert_eq!(share.per_frame(), 0);
        let share = SpanShare { frames: 2, remaining: i32::MAX };
        assert_eq!(share.per_frame(), 1 << 30);
    }

    #[test]
    fn test_long_spanning_audio_saturates_total() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        store
            .add_media(a, MediaItem::new(a, MediaType::Audio, "/m/long.m4a").with_duration(i32::MAX).spanning(true))
            .unwrap();

        let frames = content_list(&store.snapshot(n).unwrap(), &config());
        assert_eq!(frames[0].frame_max_duration, 1 << 30);
        assert_eq!(frames[1].frame_max_duration, 1 << 30);
        assert_eq!(total_duration(&frames), i32::MAX);
    }
}
