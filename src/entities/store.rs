//! Store: narrative/frame/media database with JSON persistence.
//!
//! Holds every narrative, frame, media item and spanning link. The store is
//! the unit of serialization (`Store::to_json` / `Store::from_json`).
//!
//! # Soft delete
//!
//! Deleting never removes rows or files. Entities are flagged `deleted` and
//! disappear from queries; [`Store::sweep`] later removes flagged rows (and
//! rows orphaned by a flagged parent) and their media files. The sweep only
//! acts on rows that are already flagged, so it is idempotent and can run
//! from another thread while the store is in use.
//!
//! # Spanning media
//!
//! A spanning item stays owned by its root frame; each following frame that
//! shows it holds a [`MediaLink`]. A chain of links runs over consecutive
//! frames and stops at the first frame whose own media of that type blocks
//! it: any own image/video (or text, for text), or for audio a frame that
//! already owns `max_audio_items` audio items or owns spanning audio itself.
//!
//! # Templates
//!
//! Templates are narrative rows of [`NarrativeKind::Template`] with their own
//! sequence numbering. Starting a narrative from a template (or saving a
//! narrative as one) deep-copies frames, media rows and links; media files are
//! shared between the copies and only removed once no row uses them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Frame, MediaItem, MediaLink, MediaType, Narrative, NarrativeKind};
use crate::config::TimingConfig;
use crate::core::snapshot::NarrativeSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    NarrativeNotFound(Uuid),
    FrameNotFound(Uuid),
    MediaNotFound(Uuid),
    /// Adding or changing media would break a frame's per-type limits.
    MediaLimit(String),
    Io(String),
    Parse(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NarrativeNotFound(id) => write!(f, "Narrative not found: {}", id),
            StoreError::FrameNotFound(id) => write!(f, "Frame not found: {}", id),
            StoreError::MediaNotFound(id) => write!(f, "Media not found: {}", id),
            StoreError::MediaLimit(e) => write!(f, "Media limit: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Counts of rows and files removed by [`Store::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub narratives: usize,
    pub templates: usize,
    pub frames: usize,
    pub media: usize,
    pub links: usize,
    pub files_removed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.narratives + self.templates + self.frames + self.media + self.links == 0
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    narratives: HashMap<Uuid, Narrative>,
    #[serde(default)]
    frames: HashMap<Uuid, Frame>,
    #[serde(default)]
    media: HashMap<Uuid, MediaItem>,
    #[serde(default)]
    links: Vec<MediaLink>,
}

impl StoreData {
    fn live_narrative(&self, id: Uuid) -> Result<&Narrative, StoreError> {
        self.narratives.get(&id).filter(|n| !n.deleted).ok_or(StoreError::NarrativeNotFound(id))
    }

    fn live_frame(&self, id: Uuid) -> Result<&Frame, StoreError> {
        self.frames.get(&id).filter(|f| !f.deleted).ok_or(StoreError::FrameNotFound(id))
    }

    fn live_media(&self, id: Uuid) -> Result<&MediaItem, StoreError> {
        self.media.get(&id).filter(|m| !m.deleted).ok_or(StoreError::MediaNotFound(id))
    }

    fn next_sequence_id(&self, kind: NarrativeKind) -> i32 {
        self.narratives.values().filter(|n| n.kind == kind).map(|n| n.sequence_id).max().unwrap_or(0) + 1
    }

    /// Deep-copy a live narrative (frames, media rows, links) as a new row of `kind`.
    fn copy_narrative(&mut self, source_id: Uuid, kind: NarrativeKind) -> Result<Uuid, StoreError> {
        self.live_narrative(source_id)?;
        let copy = Narrative::with_kind(kind, self.next_sequence_id(kind));
        let copy_id = copy.id;

        let mut frame_ids: HashMap<Uuid, Uuid> = HashMap::new();
        let frames: Vec<Frame> = self.narrative_frames(source_id).into_iter().cloned().collect();
        for frame in frames {
            let new_id = Uuid::new_v4();
            frame_ids.insert(frame.id, new_id);
            self.frames.insert(new_id, Frame { id: new_id, narrative_id: copy_id, ..frame });
        }

        let mut media_ids: HashMap<Uuid, Uuid> = HashMap::new();
        let media: Vec<MediaItem> = self
            .media
            .values()
            .filter(|m| !m.deleted && frame_ids.contains_key(&m.parent_frame_id))
            .cloned()
            .collect();
        for item in media {
            let new_id = Uuid::new_v4();
            let parent_frame_id = frame_ids[&item.parent_frame_id];
            media_ids.insert(item.id, new_id);
            self.media.insert(new_id, MediaItem { id: new_id, parent_frame_id, ..item });
        }

        let links: Vec<MediaLink> = self
            .links
            .iter()
            .filter(|l| !l.deleted)
            .filter_map(|l| Some(MediaLink::new(*frame_ids.get(&l.frame_id)?, *media_ids.get(&l.media_id)?)))
            .collect();
        self.links.extend(links);

        self.narratives.insert(copy_id, copy);
        debug!("Copied {} -> {} ({} frames, {} media)", source_id, copy_id, frame_ids.len(), media_ids.len());
        Ok(copy_id)
    }

    /// Live frames of a narrative in playback order.
    fn narrative_frames(&self, narrative_id: Uuid) -> Vec<&Frame> {
        let mut frames: Vec<&Frame> = self
            .frames
            .values()
            .filter(|f| f.narrative_id == narrative_id && !f.deleted)
            .collect();
        frames.sort_by_key(|f| (f.sequence_id, f.created_ms));
        frames
    }

    /// (previous frame, following frames) around `frame_id`.
    fn neighbours(&self, frame_id: Uuid) -> (Option<Uuid>, Vec<Uuid>) {
        let Some(frame) = self.frames.get(&frame_id) else {
            return (None, Vec::new());
        };
        let ids: Vec<Uuid> = self.narrative_frames(frame.narrative_id).iter().map(|f| f.id).collect();
        match ids.iter().position(|id| *id == frame_id) {
            Some(pos) => (pos.checked_sub(1).map(|p| ids[p]), ids[pos + 1..].to_vec()),
            // frame already flagged deleted: neighbours by sequence position
            None => {
                let prev = self
                    .narrative_frames(frame.narrative_id)
                    .into_iter()
                    .rev()
                    .find(|f| (f.sequence_id, f.created_ms) < (frame.sequence_id, frame.created_ms))
                    .map(|f| f.id);
                let next = self
                    .narrative_frames(frame.narrative_id)
                    .into_iter()
                    .filter(|f| (f.sequence_id, f.created_ms) > (frame.sequence_id, frame.created_ms))
                    .map(|f| f.id)
                    .collect();
                (prev, next)
            }
        }
    }

    fn own_media(&self, frame_id: Uuid) -> impl Iterator<Item = &MediaItem> {
        self.media.values().filter(move |m| m.parent_frame_id == frame_id && !m.deleted)
    }

    fn linked_media(&self, frame_id: Uuid) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for link in self.links.iter().filter(|l| l.frame_id == frame_id && !l.deleted) {
            if self.live_media(link.media_id).is_ok() && !ids.contains(&link.media_id) {
                ids.push(link.media_id);
            }
        }
        ids
    }

    fn has_link(&self, frame_id: Uuid, media_id: Uuid) -> bool {
        self.links.iter().any(|l| l.frame_id == frame_id && l.media_id == media_id && !l.deleted)
    }

    /// Spanning items shown on a frame (own and inherited), by (type, creation).
    fn spanning_media(&self, frame_id: Uuid) -> Vec<Uuid> {
        let linked = self.linked_media(frame_id);
        let mut items: Vec<&MediaItem> = self
            .media
            .values()
            .filter(|m| !m.deleted && m.span_frames)
            .filter(|m| m.parent_frame_id == frame_id || linked.contains(&m.id))
            .collect();
        items.sort_by_key(|m| (m.media_type, m.created_ms, m.id));
        items.into_iter().map(|m| m.id).collect()
    }

    /// Whether the frame's own media stops `media` from spanning into it.
    fn blocks(&self, frame_id: Uuid, media: &MediaItem, max_audio_items: usize) -> bool {
        if media.media_type == MediaType::Audio {
            let audio: Vec<&MediaItem> =
                self.own_media(frame_id).filter(|m| m.media_type == MediaType::Audio && m.id != media.id).collect();
            audio.len() >= max_audio_items || audio.iter().any(|m| m.span_frames)
        } else {
            self.own_media(frame_id)
                .any(|m| m.id != media.id && m.media_type.slot() == media.media_type.slot())
        }
    }

    /// Link `media_id` into consecutive `frames` until one blocks it.
    fn propagate(&mut self, media_id: Uuid, frames: &[Uuid], max_audio_items: usize) -> usize {
        let Some(media) = self.media.get(&media_id).cloned() else {
            return 0;
        };
        let mut added = 0;
        for &frame_id in frames {
            if media.is_root(frame_id) || self.blocks(frame_id, &media, max_audio_items) {
                break;
            }
            if !self.has_link(frame_id, media_id) {
                self.links.push(MediaLink::new(frame_id, media_id));
                added += 1;
            }
        }
        if added > 0 {
            debug!("Propagated media {} into {} frames", media_id, added);
        }
        added
    }

    /// Soft-delete every live link to `media_id`. Returns the unlinked frames.
    fn unlink_all(&mut self, media_id: Uuid) -> Vec<Uuid> {
        let mut frames = Vec::new();
        for link in self.links.iter_mut().filter(|l| l.media_id == media_id && !l.deleted) {
            link.deleted = true;
            frames.push(link.frame_id);
        }
        frames
    }

    /// Soft-delete the links of `media_id` from `frame_id` onwards, while
    /// consecutive frames keep linking it. Returns the unlinked frames.
    fn end_chain(&mut self, media_id: Uuid, frame_id: Uuid) -> Vec<Uuid> {
        let (_, following) = self.neighbours(frame_id);
        let mut ended = Vec::new();
        for id in std::iter::once(frame_id).chain(following) {
            if !self.has_link(id, media_id) {
                break;
            }
            for link in self.links.iter_mut().filter(|l| l.frame_id == id && l.media_id == media_id) {
                link.deleted = true;
            }
            ended.push(id);
        }
        ended
    }

    /// End the chains of inherited items that the frame's own media now blocks.
    fn apply_overrides(&mut self, frame_id: Uuid, max_audio_items: usize) -> Vec<Uuid> {
        let mut ended = Vec::new();
        for media_id in self.linked_media(frame_id) {
            let Some(media) = self.media.get(&media_id).cloned() else {
                continue;
            };
            if self.blocks(frame_id, &media, max_audio_items) {
                debug!("Frame {}: own media overrides inherited {}", frame_id, media_id);
                ended.extend(self.end_chain(media_id, frame_id));
            }
        }
        ended
    }

    /// Flag frames that show nothing any more (no own media, no live links).
    fn delete_blank_frames(&mut self, frames: &[Uuid], keep: Option<Uuid>) -> usize {
        let blank: Vec<Uuid> = frames
            .iter()
            .copied()
            .filter(|id| Some(*id) != keep)
            .filter(|id| self.own_media(*id).next().is_none() && self.linked_media(*id).is_empty())
            .collect();
        for id in &blank {
            if let Some(frame) = self.frames.get_mut(id) {
                if !frame.deleted {
                    debug!("Frame {} is blank; flagged deleted", id);
                    frame.deleted = true;
                }
            }
        }
        blank.len()
    }

    /// Propagate the previous frame's spanning media (optionally one slot only)
    /// into `frames`.
    fn inherit_from(&mut self, previous: Option<Uuid>, frames: &[Uuid], slot: Option<MediaType>, max_audio_items: usize) {
        let Some(previous) = previous else {
            return;
        };
        for media_id in self.spanning_media(previous) {
            let matches = slot.is_none_or(|s| self.media.get(&media_id).is_some_and(|m| m.media_type.slot() == s));
            if matches {
                self.propagate(media_id, frames, max_audio_items);
            }
        }
    }

    fn insert_frame_after(&mut self, frame_id: Uuid) -> Result<Uuid, StoreError> {
        let frame = self.live_frame(frame_id)?.clone();
        let (_, following) = self.neighbours(frame_id);
        for id in &following {
            if let Some(f) = self.frames.get_mut(id) {
                f.sequence_id += 1;
            }
        }

        let new_frame = Frame::new(frame.narrative_id, frame.sequence_id + 1);
        let new_id = new_frame.id;
        self.frames.insert(new_id, new_frame);

        for media_id in self.spanning_media(frame_id) {
            self.links.push(MediaLink::new(new_id, media_id));
        }
        Ok(new_id)
    }
}

/// Shared narrative store. Clones share the same data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    #[serde(with = "arc_rwlock_data")]
    data: Arc<RwLock<StoreData>>,

    /// Audio items allowed per frame (runtime-only)
    #[serde(skip, default = "Store::default_max_audio_items")]
    max_audio_items: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    fn default_max_audio_items() -> usize {
        TimingConfig::default().max_audio_items
    }

    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(StoreData::default())),
            max_audio_items: Self::default_max_audio_items(),
        }
    }

    /// Use the audio limit from `config` for media validation.
    pub fn with_config(mut self, config: &TimingConfig) -> Self {
        self.max_audio_items = config.max_audio_items;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    // === Queries ===

    fn live_of_kind(&self, kind: NarrativeKind) -> Vec<Narrative> {
        let data = self.read();
        let mut narratives: Vec<Narrative> =
            data.narratives.values().filter(|n| !n.deleted && n.kind == kind).cloned().collect();
        narratives.sort_by_key(|n| (n.sequence_id, n.created_ms));
        narratives
    }

    /// Live narratives (templates excluded) ordered by external sequence id.
    pub fn narratives(&self) -> Vec<Narrative> {
        self.live_of_kind(NarrativeKind::Narrative)
    }

    /// Live templates ordered by external sequence id.
    pub fn templates(&self) -> Vec<Narrative> {
        self.live_of_kind(NarrativeKind::Template)
    }

    /// Flagged rows of a kind still waiting for [`Store::sweep`].
    pub fn deleted(&self, kind: NarrativeKind) -> Vec<Uuid> {
        self.read().narratives.values().filter(|n| n.deleted && n.kind == kind).map(|n| n.id).collect()
    }

    pub fn narrative(&self, id: Uuid) -> Option<Narrative> {
        self.read().narratives.get(&id).cloned()
    }

    /// Live frames of a narrative in playback order.
    pub fn frames(&self, narrative_id: Uuid) -> Vec<Frame> {
        self.read().narrative_frames(narrative_id).into_iter().cloned().collect()
    }

    pub fn frame(&self, id: Uuid) -> Option<Frame> {
        self.read().frames.get(&id).cloned()
    }

    pub fn media(&self, id: Uuid) -> Option<MediaItem> {
        self.read().media.get(&id).cloned()
    }

    /// Frames (other than the owner) linking to a media item.
    pub fn linked_frames(&self, media_id: Uuid) -> Vec<Uuid> {
        self.read()
            .links
            .iter()
            .filter(|l| l.media_id == media_id && !l.deleted)
            .map(|l| l.frame_id)
            .collect()
    }

    /// Resolved snapshot of one narrative, with text contents loaded from disk.
    pub fn snapshot(&self, narrative_id: Uuid) -> Result<NarrativeSnapshot, StoreError> {
        let (narrative, frames, media, links) = {
            let data = self.read();
            let narrative = data.live_narrative(narrative_id)?.clone();
            let frames: Vec<Frame> = data.narrative_frames(narrative_id).into_iter().cloned().collect();
            let frame_ids: HashSet<Uuid> = frames.iter().map(|f| f.id).collect();
            let links: Vec<MediaLink> =
                data.links.iter().filter(|l| frame_ids.contains(&l.frame_id)).cloned().collect();
            let linked: HashSet<Uuid> = links.iter().map(|l| l.media_id).collect();
            let media: HashMap<Uuid, MediaItem> = data
                .media
                .values()
                .filter(|m| frame_ids.contains(&m.parent_frame_id) || linked.contains(&m.id))
                .map(|m| (m.id, m.clone()))
                .collect();
            (narrative, frames, media, links)
        };

        Ok(NarrativeSnapshot::resolve(narrative, frames, &media, &links, load_text))
    }

    // === Editing ===

    /// Create an empty narrative with the next external sequence id.
    pub fn create_narrative(&self) -> Uuid {
        self.create(NarrativeKind::Narrative)
    }

    /// Create an empty template; templates are numbered separately.
    pub fn create_template(&self) -> Uuid {
        self.create(NarrativeKind::Template)
    }

    fn create(&self, kind: NarrativeKind) -> Uuid {
        let mut data = self.write();
        let next = data.next_sequence_id(kind);
        let narrative = Narrative::with_kind(kind, next);
        let id = narrative.id;
        data.narratives.insert(id, narrative);
        info!("Created {:?} {} (#{})", kind, id, next);
        id
    }

    /// Start a new narrative as a copy of a template.
    pub fn create_from_template(&self, template_id: Uuid) -> Result<Uuid, StoreError> {
        let mut data = self.write();
        if !data.live_narrative(template_id)?.is_template() {
            return Err(StoreError::NarrativeNotFound(template_id));
        }
        let id = data.copy_narrative(template_id, NarrativeKind::Narrative)?;
        info!("Created narrative {} from template {}", id, template_id);
        Ok(id)
    }

    /// Save a copy of a narrative as a new template.
    pub fn save_as_template(&self, narrative_id: Uuid) -> Result<Uuid, StoreError> {
        let mut data = self.write();
        if data.live_narrative(narrative_id)?.is_template() {
            return Err(StoreError::NarrativeNotFound(narrative_id));
        }
        let id = data.copy_narrative(narrative_id, NarrativeKind::Template)?;
        info!("Saved narrative {} as template {}", narrative_id, id);
        Ok(id)
    }

    /// Insert an existing narrative row (import).
    pub fn add_narrative(&self, narrative: Narrative) -> Uuid {
        let id = narrative.id;
        self.write().narratives.insert(id, narrative);
        id
    }

    /// Append a frame at the end of a narrative. It inherits the spanning
    /// media of the current last frame.
    pub fn add_frame(&self, narrative_id: Uuid) -> Result<Uuid, StoreError> {
        let mut data = self.write();
        data.live_narrative(narrative_id)?;
        let last = data.narrative_frames(narrative_id).last().map(|f| f.id);
        match last {
            Some(last) => data.insert_frame_after(last),
            None => {
                let frame = Frame::new(narrative_id, 1);
                let id = frame.id;
                data.frames.insert(id, frame);
                Ok(id)
            }
        }
    }

    /// Insert a frame directly after `frame_id`, shifting the sequence ids of
    /// following frames. The new frame links the spanning media of `frame_id`.
    pub fn insert_frame_after(&self, frame_id: Uuid) -> Result<Uuid, StoreError> {
        let id = self.write().insert_frame_after(frame_id)?;
        debug!("Inserted frame {} after {}", id, frame_id);
        Ok(id)
    }

    /// Attach media to a frame (the item's parent is set to `frame_id`).
    ///
    /// Own media of a type ends any inherited chain of that type at this
    /// frame; spanning items are linked into following frames.
    pub fn add_media(&self, frame_id: Uuid, mut item: MediaItem) -> Result<Uuid, StoreError> {
        let max_audio = self.max_audio_items;
        let mut data = self.write();
        data.live_frame(frame_id)?;
        item.parent_frame_id = frame_id;
        item.deleted = false;

        if item.media_type == MediaType::Audio {
            let audio: Vec<&MediaItem> = data.own_media(frame_id).filter(|m| m.media_type == MediaType::Audio).collect();
            if audio.len() >= max_audio {
                return Err(StoreError::MediaLimit(format!("frame {} already has {} audio items", frame_id, audio.len())));
            }
            if item.span_frames && audio.iter().any(|m| m.span_frames) {
                return Err(StoreError::MediaLimit(format!("frame {} already has spanning audio", frame_id)));
            }
        } else if data.own_media(frame_id).any(|m| m.media_type.slot() == item.media_type.slot()) {
            return Err(StoreError::MediaLimit(format!(
                "frame {} already has {} media",
                frame_id,
                item.media_type.label()
            )));
        }

        let id = item.id;
        let spanning = item.span_frames;
        data.media.insert(id, item);

        let ended = data.apply_overrides(frame_id, max_audio);
        if spanning {
            let (_, following) = data.neighbours(frame_id);
            data.propagate(id, &following, max_audio);
        }
        data.delete_blank_frames(&ended, Some(frame_id));
        Ok(id)
    }

    pub fn set_duration(&self, media_id: Uuid, duration_ms: i32) -> Result<(), StoreError> {
        let mut data = self.write();
        data.live_media(media_id)?;
        if let Some(m) = data.media.get_mut(&media_id) {
            m.duration_ms = duration_ms;
        }
        Ok(())
    }

    /// Turn frame spanning on or off for a media item.
    ///
    /// On: link into following frames until blocked. Off: drop every link;
    /// frames that then show nothing are flagged deleted.
    pub fn set_span_frames(&self, media_id: Uuid, span_frames: bool) -> Result<(), StoreError> {
        let max_audio = self.max_audio_items;
        let mut data = self.write();
        let item = data.live_media(media_id)?.clone();
        if item.span_frames == span_frames {
            return Ok(());
        }
        let owner = item.parent_frame_id;
        if span_frames
            && item.media_type == MediaType::Audio
            && data.own_media(owner).any(|m| m.media_type == MediaType::Audio && m.span_frames)
        {
            return Err(StoreError::MediaLimit(format!("frame {} already has spanning audio", owner)));
        }

        if let Some(m) = data.media.get_mut(&media_id) {
            m.span_frames = span_frames;
        }

        if span_frames {
            let ended = data.apply_overrides(owner, max_audio);
            let (_, following) = data.neighbours(owner);
            data.propagate(media_id, &following, max_audio);
            data.delete_blank_frames(&ended, Some(owner));
        } else {
            let unlinked = data.unlink_all(media_id);
            let removed = data.delete_blank_frames(&unlinked, None);
            debug!("Media {} stopped spanning: {} links removed, {} frames blank", media_id, unlinked.len(), removed);
        }
        Ok(())
    }

    /// Soft-delete a media item and its links. The previous frame's spanning
    /// media of the same type then flows back into the owner frame.
    pub fn delete_media(&self, media_id: Uuid) -> Result<(), StoreError> {
        let max_audio = self.max_audio_items;
        let mut data = self.write();
        let item = data.live_media(media_id)?.clone();
        if let Some(m) = data.media.get_mut(&media_id) {
            m.deleted = true;
        }

        let unlinked = data.unlink_all(media_id);
        data.delete_blank_frames(&unlinked, None);

        let owner = item.parent_frame_id;
        if data.live_frame(owner).is_ok() {
            let (previous, following) = data.neighbours(owner);
            let frames: Vec<Uuid> = std::iter::once(owner).chain(following).collect();
            data.inherit_from(previous, &frames, Some(item.media_type.slot()), max_audio);
        }
        debug!("Deleted media {} ({} links)", media_id, unlinked.len());
        Ok(())
    }

    /// Soft-delete a frame, its own media and its links. Spanning media of the
    /// previous frame then flows into the frames that followed it.
    pub fn delete_frame(&self, frame_id: Uuid) -> Result<(), StoreError> {
        let max_audio = self.max_audio_items;
        let mut data = self.write();
        data.live_frame(frame_id)?;
        let (previous, _) = data.neighbours(frame_id);
        if let Some(frame) = data.frames.get_mut(&frame_id) {
            frame.deleted = true;
        }

        let own: Vec<Uuid> = data.own_media(frame_id).map(|m| m.id).collect();
        let mut unlinked = Vec::new();
        for id in &own {
            if let Some(m) = data.media.get_mut(id) {
                m.deleted = true;
            }
            unlinked.extend(data.unlink_all(*id));
        }
        for link in data.links.iter_mut().filter(|l| l.frame_id == frame_id) {
            link.deleted = true;
        }
        data.delete_blank_frames(&unlinked, None);

        let (_, following) = data.neighbours(frame_id);
        data.inherit_from(previous, &following, None, max_audio);
        info!("Deleted frame {} ({} media)", frame_id, own.len());
        Ok(())
    }

    /// Soft-delete a narrative or template with all its frames and media.
    pub fn delete_narrative(&self, narrative_id: Uuid) -> Result<(), StoreError> {
        let mut data = self.write();
        data.live_narrative(narrative_id)?;
        if let Some(n) = data.narratives.get_mut(&narrative_id) {
            n.deleted = true;
        }
        let frames: HashSet<Uuid> = data
            .frames
            .values()
            .filter(|f| f.narrative_id == narrative_id)
            .map(|f| f.id)
            .collect();
        for frame in data.frames.values_mut().filter(|f| frames.contains(&f.id)) {
            frame.deleted = true;
        }
        for media in data.media.values_mut().filter(|m| frames.contains(&m.parent_frame_id)) {
            media.deleted = true;
        }
        info!("Deleted narrative {} ({} frames)", narrative_id, frames.len());
        Ok(())
    }

    // === Cleanup ===

    /// Remove flagged rows and the files of removed media.
    ///
    /// Rows whose parent is gone or flagged are removed too. Missing files
    /// are skipped. Running it again without new deletions does nothing.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let files = {
            let mut data = self.write();

            let dead_narratives: HashSet<Uuid> =
                data.narratives.values().filter(|n| n.deleted).map(|n| n.id).collect();
            report.templates = data.narratives.values().filter(|n| n.deleted && n.is_template()).count();
            report.narratives = dead_narratives.len() - report.templates;
            data.narratives.retain(|id, _| !dead_narratives.contains(id));

            let live_narratives: HashSet<Uuid> = data.narratives.keys().copied().collect();
            let dead_frames: HashSet<Uuid> = data
                .frames
                .values()
                .filter(|f| f.deleted || !live_narratives.contains(&f.narrative_id))
                .map(|f| f.id)
                .collect();
            data.frames.retain(|id, _| !dead_frames.contains(id));
            report.frames = dead_frames.len();

            let live_frames: HashSet<Uuid> = data.frames.keys().copied().collect();
            let dead_media: Vec<MediaItem> = data
                .media
                .values()
                .filter(|m| m.deleted || !live_frames.contains(&m.parent_frame_id))
                .cloned()
                .collect();
            for m in &dead_media {
                data.media.remove(&m.id);
            }
            report.media = dead_media.len();

            let before = data.links.len();
            let StoreData { links, media, .. } = &mut *data;
            links.retain(|l| !l.deleted && live_frames.contains(&l.frame_id) && media.contains_key(&l.media_id));
            report.links = before - links.len();

            // copies made from templates share files with their source
            let in_use: HashSet<&Path> = media.values().map(|m| m.file_path.as_path()).collect();
            let mut files: Vec<_> = dead_media
                .into_iter()
                .map(|m| m.file_path)
                .filter(|path| !in_use.contains(path.as_path()))
                .collect();
            files.sort();
            files.dedup();
            files
        };

        // files are removed outside the lock
        for path in files {
            match fs::remove_file(&path) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        if !report.is_empty() {
            info!("Sweep: {:?}", report);
        }
        report
    }

    // === Persistence ===

    /// Serialize store to JSON file.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Parse(e.to_string()))?;
        let path = path.as_ref();
        fs::write(path, json).map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        debug!("Saved store to {}", path.display());
        Ok(())
    }

    /// Load store from JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        let store: Store = serde_json::from_str(&json).map_err(|e| StoreError::Parse(e.to_string()))?;
        info!("Loaded store from {} ({} narratives)", path.display(), store.narratives().len());
        Ok(store)
    }
}

fn load_text(item: &MediaItem) -> Option<String> {
    match fs::read_to_string(&item.file_path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Text {} unreadable ({}): {}", item.id, item.file_path.display(), e);
            None
        }
    }
}

// Serde helper for Arc<RwLock<StoreData>>
mod arc_rwlock_data {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(data: &Arc<RwLock<StoreData>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        data.read().unwrap_or_else(PoisonError::into_inner).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<RwLock<StoreData>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = StoreData::deserialize(deserializer)?;
        Ok(Arc::new(RwLock::new(data)))
    }
}
