//! Per-vessel sliding windows of recent reports.
//!
//! One `TrackStore` per replay session, owned by the driver task and dropped
//! with it. Never a process-wide singleton, never shared across sessions.

use std::collections::{HashMap, VecDeque};

use ais_types::AisPoint;

/// Bounded FIFO ring of recent points per vessel.
pub struct TrackStore {
    capacity: usize,
    tracks: HashMap<String, VecDeque<AisPoint>>,
}

impl TrackStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tracks: HashMap::new(),
        }
    }

    /// Append a point to its vessel's ring, evicting strictly FIFO, and
    /// return the window after insertion (oldest first).
    pub fn push(&mut self, point: AisPoint) -> &VecDeque<AisPoint> {
        let capacity = self.capacity;
        let ring = self.tracks.entry(point.mmsi.clone()).or_default();
        if ring.len() == capacity {
            ring.pop_front();
        }
        ring.push_back(point);
        ring
    }

    /// The point immediately prior to the most recent one for `mmsi`.
    pub fn previous(&self, mmsi: &str) -> Option<&AisPoint> {
        let ring = self.tracks.get(mmsi)?;
        if ring.len() >= 2 {
            ring.get(ring.len() - 2)
        } else {
            None
        }
    }

    pub fn vessel_count(&self) -> usize {
        self.tracks.len()
    }
}
