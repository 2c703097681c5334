//! Narrative: an ordered multimedia story made of frames.
//!
//! Templates are narratives kept aside to start new stories from. They share
//! the row type but number their `sequence_id`s separately.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::now_ms;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarrativeKind {
    #[default]
    Narrative,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub id: Uuid,
    /// External display number (1, 2, 3...). Not the ordering of frames.
    pub sequence_id: i32,
    #[serde(default)]
    pub kind: NarrativeKind,
    #[serde(default)]
    pub created_ms: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Narrative {
    pub fn new(sequence_id: i32) -> Self {
        Self::with_kind(NarrativeKind::Narrative, sequence_id)
    }

    pub fn template(sequence_id: i32) -> Self {
        Self::with_kind(NarrativeKind::Template, sequence_id)
    }

    pub fn with_kind(kind: NarrativeKind, sequence_id: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence_id,
            kind,
            created_ms: now_ms(),
            deleted: false,
        }
    }

    pub fn is_template(&self) -> bool {
        self.kind == NarrativeKind::Template
    }
}
