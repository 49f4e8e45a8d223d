//! Durable set of pending mutation markers.
//!
//! A marker `(zone, entity)` means "push this entity's current state". The
//! set is rewritten atomically on every change. Markers are only removed
//! once the remote outcome for them is known, so a crash mid-push leaves
//! them in place to be retried.

use crate::dir::{SyncDir, QUEUE_FILE};
use outsync_protocol::{EntityId, ZoneId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

const QUEUE_FORMAT_VERSION: u32 = 1;

/// A queued intent to push one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingMarker {
    /// Zone the entity lives in.
    pub zone: ZoneId,
    /// The entity to push.
    pub entity: EntityId,
}

impl PendingMarker {
    /// Creates a marker.
    pub fn new(zone: ZoneId, entity: EntityId) -> Self {
        Self { zone, entity }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    markers: Vec<PendingMarker>,
}

/// Markers read for one push, with the generation each was read at.
#[derive(Debug, Clone, Default)]
pub struct DrainedMarkers {
    markers: BTreeMap<PendingMarker, u64>,
}

impl DrainedMarkers {
    /// Returns the markers in order.
    pub fn markers(&self) -> impl Iterator<Item = &PendingMarker> {
        self.markers.keys()
    }

    /// Groups the drained entities by zone.
    pub fn by_zone(&self) -> BTreeMap<ZoneId, Vec<EntityId>> {
        let mut zones: BTreeMap<ZoneId, Vec<EntityId>> = BTreeMap::new();
        for marker in self.markers.keys() {
            zones
                .entry(marker.zone.clone())
                .or_default()
                .push(marker.entity.clone());
        }
        zones
    }

    /// Number of drained markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns true if nothing was pending.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Marker to the generation of its latest mark.
    pending: BTreeMap<PendingMarker, u64>,
    next_generation: u64,
}

/// The mutation queue.
#[derive(Debug)]
pub struct MutationQueue {
    dir: Option<Arc<SyncDir>>,
    state: Mutex<QueueState>,
}

impl MutationQueue {
    /// Creates a queue that is not persisted.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Loads the queue from a state directory.
    ///
    /// A missing or unreadable file yields an empty queue.
    pub fn load(dir: Arc<SyncDir>) -> Self {
        let markers = match dir.load::<QueueFile>(QUEUE_FILE) {
            Ok(Some(file)) if file.version == QUEUE_FORMAT_VERSION => file.markers,
            Ok(Some(file)) => {
                warn!(version = file.version, "unknown queue format, starting empty");
                Vec::new()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read queue, starting empty");
                Vec::new()
            }
        };

        let mut state = QueueState::default();
        for marker in markers {
            state.next_generation += 1;
            state.pending.insert(marker, state.next_generation);
        }
        debug!(pending = state.pending.len(), "loaded mutation queue");

        Self {
            dir: Some(dir),
            state: Mutex::new(state),
        }
    }

    /// Adds a marker. Returns true if it was not already pending.
    ///
    /// Re-marking a pending entity bumps its generation so that a push
    /// already in flight does not clear the newer edit.
    pub fn mark(&self, marker: PendingMarker) -> bool {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        let added = state.pending.insert(marker, generation).is_none();
        if added {
            self.persist(&state);
        }
        added
    }

    /// Adds several markers. Returns how many were new.
    pub fn mark_all<I>(&self, markers: I) -> usize
    where
        I: IntoIterator<Item = PendingMarker>,
    {
        let mut state = self.state.lock();
        let mut added = 0;
        for marker in markers {
            state.next_generation += 1;
            let generation = state.next_generation;
            if state.pending.insert(marker, generation).is_none() {
                added += 1;
            }
        }
        if added > 0 {
            self.persist(&state);
        }
        added
    }

    /// Reads every pending marker without clearing any.
    pub fn drain_for_push(&self) -> DrainedMarkers {
        DrainedMarkers {
            markers: self.state.lock().pending.clone(),
        }
    }

    /// Clears markers whose push succeeded.
    ///
    /// A marker is only cleared if it was not marked again after it was
    /// drained. Failed markers stay queued for the next flush.
    pub fn reconcile(
        &self,
        drained: &DrainedMarkers,
        succeeded: &BTreeSet<PendingMarker>,
        failed: &BTreeSet<PendingMarker>,
    ) {
        let mut state = self.state.lock();
        let mut cleared = 0usize;
        for marker in succeeded {
            let Some(drained_generation) = drained.markers.get(marker) else {
                continue;
            };
            if state.pending.get(marker) == Some(drained_generation) {
                state.pending.remove(marker);
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.persist(&state);
        }
        debug!(
            cleared,
            failed = failed.len(),
            remaining = state.pending.len(),
            "reconciled mutation queue"
        );
    }

    /// Drops every marker for a zone.
    pub fn remove_zone(&self, zone: &ZoneId) -> usize {
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.retain(|marker, _| &marker.zone != zone);
        let removed = before - state.pending.len();
        if removed > 0 {
            self.persist(&state);
        }
        removed
    }

    /// Drops every marker.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        self.persist(&state);
    }

    /// Returns the pending markers.
    pub fn snapshot(&self) -> Vec<PendingMarker> {
        self.state.lock().pending.keys().cloned().collect()
    }

    /// Returns true if the marker is pending.
    pub fn contains(&self, marker: &PendingMarker) -> bool {
        self.state.lock().pending.contains_key(marker)
    }

    /// Number of pending markers.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    fn persist(&self, state: &QueueState) {
        let Some(dir) = &self.dir else {
            return;
        };
        let file = QueueFile {
            version: QUEUE_FORMAT_VERSION,
            markers: state.pending.keys().cloned().collect(),
        };
        if let Err(e) = dir.store(QUEUE_FILE, &file) {
            warn!(error = %e, "failed to persist mutation queue");
        }
    }
}
