//! Value-typed snapshot of one narrative: frames in order, each with its
//! resolved media (own items plus spanning items inherited through links).
//!
//! Both flatteners fold over a snapshot, so they never touch the store and
//! can be tested with plain values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Frame, MediaItem, MediaLink, MediaType, Narrative};

/// A media item as seen from one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub item: MediaItem,
    /// File contents, text items only.
    pub text: Option<String>,
    /// Live frames linking to this item, in sequence order (owner excluded).
    pub linked_frame_ids: Vec<Uuid>,
}

impl ResolvedMedia {
    pub fn media_type(&self) -> MediaType {
        self.item.media_type
    }
}

/// One frame and everything it displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameContent {
    pub frame: Frame,
    /// Ordered by (type, creation time).
    pub media: Vec<ResolvedMedia>,
}

impl FrameContent {
    pub fn id(&self) -> Uuid {
        self.frame.id
    }

    /// First item of the given kind, if any.
    pub fn first_where(&self, pred: impl Fn(MediaType) -> bool) -> Option<&ResolvedMedia> {
        self.media.iter().find(|m| pred(m.media_type()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSnapshot {
    pub narrative: Narrative,
    pub frames: Vec<FrameContent>,
}

impl NarrativeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Build a snapshot from raw rows.
    ///
    /// - `frames`: any frames; only live frames of this narrative are kept,
    ///   ordered by `sequence_id` then creation time.
    /// - `media` / `links`: deleted rows are ignored, as are links to
    ///   deleted media.
    /// - `load_text`: called once per text item to fetch its contents.
    pub fn resolve<F>(
        narrative: Narrative,
        frames: impl IntoIterator<Item = Frame>,
        media: &HashMap<Uuid, MediaItem>,
        links: &[MediaLink],
        load_text: F,
    ) -> Self
    where
        F: Fn(&MediaItem) -> Option<String>,
    {
        let mut frames: Vec<Frame> = frames
            .into_iter()
            .filter(|f| f.narrative_id == narrative.id && !f.deleted)
            .collect();
        frames.sort_by_key(|f| (f.sequence_id, f.created_ms));

        // live links per frame, and linking frames per media (in frame order)
        let mut links_by_frame: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut linkers: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for frame in &frames {
            for link in links.iter().filter(|l| l.frame_id == frame.id && !l.deleted) {
                let live = media.get(&link.media_id).is_some_and(|m| !m.deleted);
                if !live {
                    continue;
                }
                let frame_links = links_by_frame.entry(frame.id).or_default();
                if !frame_links.contains(&link.media_id) {
                    frame_links.push(link.media_id);
                    linkers.entry(link.media_id).or_default().push(frame.id);
                }
            }
        }

        let mut texts: HashMap<Uuid, Option<String>> = HashMap::new();
        let frames = frames
            .into_iter()
            .map(|frame| {
                let linked = links_by_frame.get(&frame.id);
                let mut items: Vec<&MediaItem> = media
                    .values()
                    .filter(|m| !m.deleted)
                    .filter(|m| m.parent_frame_id == frame.id || linked.is_some_and(|l| l.contains(&m.id)))
                    .collect();
                items.sort_by_key(|m| (m.media_type, m.created_ms, m.id));

                let media = items
                    .into_iter()
                    .map(|item| {
                        let text = if item.media_type == MediaType::Text {
                            texts.entry(item.id).or_insert_with(|| load_text(item)).clone()
                        } else {
                            None
                        };
                        ResolvedMedia {
                            item: item.clone(),
                            text,
                            linked_frame_ids: linkers.get(&item.id).cloned().unwrap_or_default(),
                        }
                    })
                    .collect();
                FrameContent { frame, media }
            })
            .collect();

        Self { narrative, frames }
    }
}
