//! Frame: one step of a narrative.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::now_ms;

/// One ordered position in a narrative.
///
/// `sequence_id` defines playback order; values need not be contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    pub narrative_id: Uuid,
    pub sequence_id: i32,
    #[serde(default)]
    pub created_ms: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl Frame {
    pub fn new(narrative_id: Uuid, sequence_id: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            narrative_id,
            sequence_id,
            created_ms: now_ms(),
            deleted: false,
        }
    }
}
