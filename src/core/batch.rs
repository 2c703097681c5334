//! Flatten many narratives at once on the rayon pool.
//!
//! Snapshots are taken up front (short read locks), then each narrative is
//! flattened independently. Output keeps narrative order.

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::export::{content_list, ExportFrame};
use super::playback::{playback_content, PlaybackTimeline};
use super::snapshot::NarrativeSnapshot;
use crate::config::TimingConfig;
use crate::entities::{Narrative, Store};

/// One narrative with its flattened output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedNarrative<T> {
    pub narrative: Narrative,
    pub content: T,
}

fn snapshots(store: &Store) -> Vec<NarrativeSnapshot> {
    store
        .narratives()
        .into_iter()
        .filter_map(|n| match store.snapshot(n.id) {
            Ok(snap) => Some(snap),
            // deleted between listing and snapshot
            Err(e) => {
                warn!("Skipping narrative {}: {}", n.id, e);
                None
            }
        })
        .collect()
}

fn map_narratives<T, F>(store: &Store, flatten: F) -> Vec<FlattenedNarrative<T>>
where
    T: Send,
    F: Fn(&NarrativeSnapshot) -> T + Sync,
{
    let snapshots = snapshots(store);
    debug!("Flattening {} narratives", snapshots.len());
    snapshots
        .into_par_iter()
        .map(|snap| {
            let content = flatten(&snap);
            FlattenedNarrative { narrative: snap.narrative, content }
        })
        .collect()
}

/// Playback timelines of every live narrative.
pub fn flatten_all(store: &Store, config: &TimingConfig, image_adjustment: i32) -> Vec<FlattenedNarrative<PlaybackTimeline>> {
    map_narratives(store, |snap| playback_content(snap, None, image_adjustment, config))
}

/// Export lists of every live narrative.
pub fn export_all(store: &Store, config: &TimingConfig) -> Vec<FlattenedNarrative<Vec<ExportFrame>>> {
    map_narratives(store, |snap| content_list(snap, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MediaItem, MediaType};

    #[test]
    fn test_flatten_all_matches_single() {
        let store = Store::new();
        let config = TimingConfig::default();
        for i in 0..6 {
            let n = store.create_narrative();
            for j in 0..=i {
                let f = store.add_frame(n).unwrap();
                let audio = MediaItem::new(f, MediaType::Audio, format!("/m/{}_{}.m4a", i, j)).with_duration(1000 * (j + 1));
                store.add_media(f, audio).unwrap();
            }
        }
        let gone = store.create_narrative();
        store.delete_narrative(gone).unwrap();

        let all = flatten_all(&store, &config, 250);
        assert_eq!(all.len(), 6);
        for (flat, narrative) in all.iter().zip(store.narratives()) {
            assert_eq!(flat.narrative.id, narrative.id);
            let single = playback_content(&store.snapshot(narrative.id).unwrap(), None, 250, &config);
            assert_eq!(flat.content, single);
        }

        let exported = export_all(&store, &config);
        let counts: Vec<usize> = exported.iter().map(|e| e.content.len()).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_empty_store() {
        let store = Store::new();
        assert!(flatten_all(&store, &TimingConfig::default(), 0).is_empty());
    }
}
