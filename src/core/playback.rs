//! Playback flattening: absolute-time schedule of every media item.
//!
//! Walks frames in order with a running `narrative_time` cursor. Frame
//! durations come from [`content_list`](super::export::content_list) so both
//! flatteners always agree on timing.
//!
//! Per frame, holders are emitted image, then text, then audio:
//! - spanning image/text inherited unchanged from the previous frame extends
//!   the previous holder (replaced at its index) instead of adding a new one
//! - spanning audio gets a single holder on its root frame covering its full
//!   length; frames that inherit it add nothing
//! - with `image_adjustment > 0`, images carry crossfade offsets, and the last
//!   frame's visible item is kept 1ms past the end
//!
//! Callers resolve their own snapshot; nothing here touches the store.

use indexmap::IndexMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::export::content_list;
use super::holder::{PlaybackMediaHolder, TERMINAL_OFFSET};
use super::snapshot::{NarrativeSnapshot, ResolvedMedia};
use crate::config::TimingConfig;
use crate::entities::MediaType;

/// Result of playback flattening.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTimeline {
    pub items: Vec<PlaybackMediaHolder>,
    pub duration_ms: i32,
    /// Start time of the requested starting frame (0 if absent or not found).
    pub start_time_ms: i32,
    /// Frame start time -> frame id, in narrative order.
    pub time_to_frame: IndexMap<i32, Uuid>,
}

impl PlaybackTimeline {
    /// Frame showing at `time_ms`, for seeking.
    pub fn frame_at(&self, time_ms: i32) -> Option<Uuid> {
        self.time_to_frame
            .iter()
            .take_while(|(start, _)| **start <= time_ms)
            .last()
            .map(|(_, id)| *id)
    }

    /// Items whose nominal range contains `time_ms`.
    pub fn items_at(&self, time_ms: i32) -> impl Iterator<Item = &PlaybackMediaHolder> {
        self.items
            .iter()
            .filter(move |h| h.start_time(false) <= time_ms && time_ms < h.end_time(false))
    }
}

fn new_holder(frame_id: Uuid, media: &ResolvedMedia, start: i32, end: i32, offsets: (i32, i32)) -> PlaybackMediaHolder {
    PlaybackMediaHolder::new(
        frame_id,
        media.item.id,
        media.item.file_path.clone(),
        media.item.media_type,
        start,
        end,
        offsets.0,
        offsets.1,
    )
}

/// Index of the previous frame's holder when `media` continues it.
fn continued(items: &[PlaybackMediaHolder], previous: Option<usize>, media: &ResolvedMedia) -> Option<usize> {
    previous.filter(|&idx| media.item.span_frames && items[idx].media_item_id == media.item.id)
}

/// Flatten a narrative into a timed playback schedule.
///
/// `image_adjustment` (ms, negative treated as 0) is how early images start
/// their crossfade.
pub fn playback_content(
    snapshot: &NarrativeSnapshot,
    starting_frame: Option<Uuid>,
    image_adjustment: i32,
    config: &TimingConfig,
) -> PlaybackTimeline {
    let adjustment = image_adjustment.max(0);
    let timed = content_list(snapshot, config);

    let mut items: Vec<PlaybackMediaHolder> = Vec::new();
    let mut time_to_frame = IndexMap::new();
    let mut narrative_time: i32 = 0;
    let mut narrative_duration = 0;
    let mut start_time = 0;
    let mut frame_found = starting_frame.is_none();

    let mut previous_image: Option<usize> = None;
    let mut previous_text: Option<usize> = None;
    let mut last_audio: Option<usize> = None;

    let last_frame = snapshot.frames.len().saturating_sub(1);
    for (position, (content, export)) in snapshot.frames.iter().zip(&timed).enumerate() {
        let frame_id = content.id();
        time_to_frame.insert(narrative_time, frame_id);

        let frame_duration = export.frame_max_duration;
        let media_end = narrative_time.saturating_add(frame_duration);
        let last_frame_adjustments = position == last_frame && adjustment > 0;

        if !frame_found && starting_frame == Some(frame_id) {
            start_time = narrative_time;
            frame_found = true;
        }

        // images: one per frame
        let image_end_adjustment = if last_frame_adjustments { TERMINAL_OFFSET } else { adjustment };
        let mut frame_image = None;
        if let Some(media) = content.first_where(MediaType::is_visual) {
            let extend = continued(&items, previous_image, media);
            let idx = match extend {
                Some(idx) => {
                    let (offset_start, _) = items[idx].playback_offsets();
                    items[idx] = items[idx].extended(Some(frame_id), media_end, offset_start, image_end_adjustment);
                    idx
                }
                None => {
                    items.push(new_holder(
                        frame_id,
                        media,
                        narrative_time,
                        media_end,
                        (adjustment, image_end_adjustment),
                    ));
                    items.len() - 1
                }
            };

            // image frame after a text-only frame: start on time, no early crossfade
            if adjustment > 0 && extend.is_none() && previous_image.is_none() && previous_text.is_some() {
                items[idx] = items[idx].with_offsets(0, image_end_adjustment);
            }
            frame_image = Some(idx);
        }

        // text: one per frame
        let text_end_adjustment = if last_frame_adjustments { TERMINAL_OFFSET } else { 0 };
        let mut frame_text = None;
        if let Some(media) = content.first_where(|t| t == MediaType::Text) {
            let idx = match continued(&items, previous_text, media) {
                Some(idx) => {
                    let (offset_start, _) = items[idx].playback_offsets();
                    items[idx] = items[idx].extended(Some(frame_id), media_end, offset_start, text_end_adjustment);
                    idx
                }
                None => {
                    items.push(new_holder(frame_id, media, narrative_time, media_end, (0, text_end_adjustment)));
                    items.len() - 1
                }
            };

            // text-only frame after an image: hold the image until the text has faded in
            if adjustment > 0 && frame_image.is_none() {
                if let Some(prev) = previous_image {
                    items[prev] = items[prev].with_offsets(adjustment, 0);
                }
            }
            frame_text = Some(idx);
        }

        // audio: spanning items are scheduled once, on their root frame, for their full length
        for media in content.media.iter().filter(|m| m.media_type() == MediaType::Audio) {
            let item = &media.item;
            if item.span_frames && !item.is_root(frame_id) {
                continue;
            }
            let audio_end = narrative_time.saturating_add(item.duration_ms.max(0));
            let mut holder = new_holder(frame_id, media, narrative_time, audio_end, (0, 0));
            if item.span_frames {
                holder = holder.with_linked_frames(media.linked_frame_ids.iter().copied());
            }
            items.push(holder);
            let idx = items.len() - 1;

            let is_latest = last_audio.is_none_or(|last| audio_end > items[last].end_time(false));
            if is_latest {
                last_audio = Some(idx);
            }
        }

        // audio-only last frame: keep the last audio item visible after playback ends
        if last_frame_adjustments && frame_image.is_none() && frame_text.is_none() {
            if let Some(idx) = last_audio {
                items[idx] = items[idx].with_offsets(0, TERMINAL_OFFSET);
            }
        }

        trace!(
            "Frame {} at {}ms: duration {}ms, image {:?}, text {:?}",
            frame_id, narrative_time, frame_duration, frame_image, frame_text
        );

        narrative_time = media_end;
        narrative_duration = narrative_duration.max(media_end);
        previous_image = frame_image;
        previous_text = frame_text;
    }

    if !frame_found {
        debug!("Starting frame {:?} not found; playback starts at 0", starting_frame);
    }
    debug!(
        "Playback flatten: narrative {} -> {} items, {}ms",
        snapshot.narrative.id,
        items.len(),
        narrative_duration
    );

    PlaybackTimeline {
        items,
        duration_ms: narrative_duration,
        start_time_ms: start_time,
        time_to_frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MediaItem, Store};

    fn config() -> TimingConfig {
        TimingConfig::default()
    }

    /// A: image (2000ms), B: text + spanning audio (4500ms), C: inherits the audio.
    fn three_frame_story() -> (Store, Uuid, [Uuid; 3], Uuid) {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        let c = store.add_frame(n).unwrap();
        store.add_media(a, MediaItem::new(a, MediaType::ImageBack, "/m/a.jpg").with_duration(2000)).unwrap();
        store.add_media(b, MediaItem::new(b, MediaType::Text, "/m/b.txt")).unwrap();
        let audio = store
            .add_media(b, MediaItem::new(b, MediaType::Audio, "/m/b.m4a").with_duration(4500).spanning(true))
            .unwrap();
        (store, n, [a, b, c], audio)
    }

    #[test]
    fn test_empty_narrative() {
        let store = Store::new();
        let n = store.create_narrative();
        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 250, &config());
        assert!(timeline.items.is_empty());
        assert_eq!(timeline.duration_ms, 0);
        assert_eq!(timeline.start_time_ms, 0);
        assert!(timeline.time_to_frame.is_empty());
    }

    #[test]
    fn test_three_frame_story() {
        let (store, n, [a, b, c], audio) = three_frame_story();
        let snap = store.snapshot(n).unwrap();

        let export = content_list(&snap, &config());
        let durations: Vec<i32> = export.iter().map(|f| f.frame_max_duration).collect();
        assert_eq!(durations, vec![2000, 2250, 2250]);

        let timeline = playback_content(&snap, None, 300, &config());
        assert_eq!(timeline.duration_ms, 6500);
        assert_eq!(
            timeline.time_to_frame.iter().map(|(t, f)| (*t, *f)).collect::<Vec<_>>(),
            vec![(0, a), (2000, b), (4250, c)]
        );

        let audio_holders: Vec<&PlaybackMediaHolder> =
            timeline.items.iter().filter(|h| h.media_type == MediaType::Audio).collect();
        assert_eq!(audio_holders.len(), 1);
        let holder = audio_holders[0];
        assert_eq!(holder.media_item_id, audio);
        assert_eq!(holder.start_time(false), 2000);
        assert_eq!(holder.end_time(false), 6500);
        assert_eq!(holder.spanning_frame_ids, vec![b, c]);
        // last frame is audio-only: audio stays visible 1ms past the end
        assert!(holder.is_terminal());
        assert_eq!(holder.end_time(true), 6501);

        let last = timeline.items.last().unwrap();
        assert_eq!(last.end_time(false), timeline.duration_ms);
    }

    #[test]
    fn test_text_after_image_holds_image() {
        let (store, n, _, _) = three_frame_story();
        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 300, &config());

        let image = &timeline.items[0];
        assert_eq!(image.media_type, MediaType::ImageBack);
        assert_eq!(image.playback_offsets(), (300, 0));
        assert_eq!(image.start_time(true), -300);

        let text = &timeline.items[1];
        assert_eq!(text.media_type, MediaType::Text);
        assert_eq!((text.start_time(false), text.end_time(false)), (2000, 4250));
    }

    #[test]
    fn test_no_adjustment_has_no_offsets() {
        let (store, n, _, _) = three_frame_story();
        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 0, &config());
        assert!(timeline.items.iter().all(|h| h.playback_offsets() == (0, 0)));
        assert_eq!(timeline.duration_ms, 6500);
    }

    #[test]
    fn test_images_and_text_precede_audio_within_frame() {
        let store = Store::new();
        let n = store.create_narrative();
        let f = store.add_frame(n).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::Audio, "/m/a.m4a").with_duration(1000)).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::Text, "/m/t.txt").with_duration(3000)).unwrap();
        store.add_media(f, MediaItem::new(f, MediaType::Video, "/m/v.mp4")).unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 0, &config());
        let types: Vec<MediaType> = timeline.items.iter().map(|h| h.media_type).collect();
        assert_eq!(types, vec![MediaType::Video, MediaType::Text, MediaType::Audio]);
    }

    #[test]
    fn test_spanning_image_extends_single_holder() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        let c = store.add_frame(n).unwrap();
        let image = store
            .add_media(a, MediaItem::new(a, MediaType::ImageFront, "/m/a.jpg").spanning(true))
            .unwrap();
        store.add_media(c, MediaItem::new(c, MediaType::ImageBack, "/m/c.jpg")).unwrap();

        let snap = store.snapshot(n).unwrap();
        let timeline = playback_content(&snap, None, 200, &config());

        let holders: Vec<&PlaybackMediaHolder> =
            timeline.items.iter().filter(|h| h.media_item_id == image).collect();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].end_time(false), 5000);
        assert_eq!(holders[0].spanning_frame_ids, vec![a, b]);
        assert_eq!(holders[0].playback_offsets(), (200, 200));

        // the final image is the last frame: terminal offset
        let last = timeline.items.last().unwrap();
        assert_eq!(last.parent_frame_id, c);
        assert_eq!(last.playback_offsets(), (200, TERMINAL_OFFSET));
        assert_eq!(timeline.duration_ms, 7500);
    }

    #[test]
    fn test_image_after_text_only_frame_starts_on_time() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        store.add_media(a, MediaItem::new(a, MediaType::Text, "/m/a.txt").with_duration(1000)).unwrap();
        store.add_media(b, MediaItem::new(b, MediaType::ImageBack, "/m/b.jpg").with_duration(1000)).unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 400, &config());
        let image = timeline.items.iter().find(|h| h.media_type == MediaType::ImageBack).unwrap();
        assert_eq!(image.playback_offsets(), (0, 400));
        assert_eq!(image.start_time(true), 1000);
    }

    #[test]
    fn test_starting_frame_resolution() {
        let (store, n, [_, b, c], _) = three_frame_story();
        let snap = store.snapshot(n).unwrap();

        assert_eq!(playback_content(&snap, Some(b), 0, &config()).start_time_ms, 2000);
        assert_eq!(playback_content(&snap, Some(c), 0, &config()).start_time_ms, 4250);
        // unknown frame falls back to the narrative start
        assert_eq!(playback_content(&snap, Some(Uuid::new_v4()), 0, &config()).start_time_ms, 0);
    }

    #[test]
    fn test_frame_at_and_items_at() {
        let (store, n, [a, b, c], _) = three_frame_story();
        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 0, &config());

        assert_eq!(timeline.frame_at(-5), None);
        assert_eq!(timeline.frame_at(0), Some(a));
        assert_eq!(timeline.frame_at(1999), Some(a));
        assert_eq!(timeline.frame_at(2000), Some(b));
        assert_eq!(timeline.frame_at(99_999), Some(c));

        let types: Vec<MediaType> = timeline.items_at(3000).map(|h| h.media_type).collect();
        assert_eq!(types, vec![MediaType::Text, MediaType::Audio]);
    }

    #[test]
    fn test_non_spanning_audio_per_frame() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        store.add_media(a, MediaItem::new(a, MediaType::Audio, "/m/a.m4a").with_duration(3000)).unwrap();
        store.add_media(b, MediaItem::new(b, MediaType::Audio, "/m/b.m4a").with_duration(1000)).unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 100, &config());
        assert_eq!(timeline.items.len(), 2);
        assert_eq!((timeline.items[1].start_time(false), timeline.items[1].end_time(false)), (3000, 4000));
        // last audio by end time gets the terminal treatment
        assert!(timeline.items[1].is_terminal());
        assert!(!timeline.items[0].is_terminal());
        // each frame lasts as long as its own audio
        assert_eq!(timeline.duration_ms, 4000);
    }

    #[test]
    fn test_idempotent() {
        let (store, n, [_, b, _], _) = three_frame_story();
        let snap = store.snapshot(n).unwrap();
        let first = playback_content(&snap, Some(b), 250, &config());
        let second = playback_content(&snap, Some(b), 250, &config());
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_duration_matches_export_sum() {
        let (store, n, _, _) = three_frame_story();
        let snap = store.snapshot(n).unwrap();
        let export = content_list(&snap, &config());
        let timeline = playback_content(&snap, None, 0, &config());
        assert_eq!(super::super::export::total_duration(&export), timeline.duration_ms);
    }

    #[test]
    fn test_spanning_text_extends_single_holder() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        let c = store.add_frame(n).unwrap();
        let text = store
            .add_media(a, MediaItem::new(a, MediaType::Text, "/m/t.txt").with_duration(1000).spanning(true))
            .unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 200, &config());
        assert_eq!(timeline.items.len(), 1);
        let holder = &timeline.items[0];
        assert_eq!(holder.media_item_id, text);
        assert_eq!((holder.start_time(false), holder.end_time(false)), (0, 3000));
        assert_eq!(holder.spanning_frame_ids, vec![a, b, c]);
        assert!(holder.is_terminal());
        assert_eq!(timeline.duration_ms, 3000);
    }

    #[test]
    fn test_uneven_spanning_audio_keeps_frame_pacing() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        let c = store.add_frame(n).unwrap();
        let audio = store
            .add_media(a, MediaItem::new(a, MediaType::Audio, "/m/long.m4a").with_duration(10_000).spanning(true))
            .unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 0, &config());
        // three ceil(10000 / 3) frames; the audio itself keeps its real length
        assert_eq!(timeline.duration_ms, 10_002);
        assert_eq!(timeline.frame_at(6668), Some(c));
        let holder = timeline.items.last().unwrap();
        assert_eq!(holder.media_item_id, audio);
        assert_eq!(holder.end_time(false), 10_000);
    }

    #[test]
    fn test_long_spanning_audio_saturates() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        store.add_frame(n).unwrap();
        store
            .add_media(a, MediaItem::new(a, MediaType::Audio, "/m/long.m4a").with_duration(i32::MAX).spanning(true))
            .unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 100, &config());
        assert_eq!(timeline.duration_ms, i32::MAX);
        let holder = &timeline.items[0];
        assert_eq!(holder.end_time(false), i32::MAX);
        assert!(holder.is_terminal());
        assert_eq!(holder.end_time(true), i32::MAX);
    }

    #[test]
    fn test_long_audio_after_image_saturates() {
        let store = Store::new();
        let n = store.create_narrative();
        let a = store.add_frame(n).unwrap();
        let b = store.add_frame(n).unwrap();
        store.add_media(a, MediaItem::new(a, MediaType::ImageBack, "/m/a.jpg").with_duration(1000)).unwrap();
        store.add_media(b, MediaItem::new(b, MediaType::Audio, "/m/b.m4a").with_duration(i32::MAX - 10)).unwrap();

        let timeline = playback_content(&store.snapshot(n).unwrap(), None, 0, &config());
        assert_eq!(timeline.duration_ms, i32::MAX);
        let audio = timeline.items.iter().find(|h| h.media_type == MediaType::Audio).unwrap();
        assert_eq!((audio.start_time(false), audio.end_time(false)), (1000, i32::MAX));
    }
}
