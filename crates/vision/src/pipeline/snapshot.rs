//! Latest-result cell shared between the worker and readers.
//!
//! Every publish carries the generation of the run that produced it. Stopping or
//! restarting the pipeline moves the cell to a new generation, so a worker that
//! outlives its run can never overwrite the state of the next one.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use video_ingest::Frame;

use crate::{detection::Detection, pipeline::lock};

/// Most recent frame and detection list, taken together under one lock.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub frame: Option<Arc<Frame>>,
    pub detections: Vec<Detection>,
    /// Count of frames captured in the run that produced this snapshot.
    pub frame_number: u64,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    current: Snapshot,
}

#[derive(Default)]
pub(crate) struct SnapshotCell {
    inner: Mutex<Slot>,
}

impl SnapshotCell {
    /// Empty the cell and accept publishes from `generation` only.
    pub(crate) fn reset(&self, generation: u64) {
        let mut slot = lock(&self.inner);
        slot.generation = generation;
        slot.current = Snapshot::default();
    }

    /// Replace the frame, and the detections when `detections` is `Some`.
    ///
    /// Returns `false` without touching the cell when `generation` is stale.
    pub(crate) fn publish(
        &self,
        generation: u64,
        frame: Arc<Frame>,
        detections: Option<Vec<Detection>>,
        frame_number: u64,
    ) -> bool {
        let mut slot = lock(&self.inner);
        if slot.generation != generation {
            return false;
        }
        slot.current.frame = Some(frame);
        if let Some(detections) = detections {
            slot.current.detections = detections;
        }
        slot.current.frame_number = frame_number;
        slot.current.published_at = Some(Utc::now());
        true
    }

    pub(crate) fn detections(&self) -> Vec<Detection> {
        lock(&self.inner).current.detections.clone()
    }

    pub(crate) fn frame(&self) -> Option<Arc<Frame>> {
        lock(&self.inner).current.frame.clone()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        lock(&self.inner).current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_generation_is_rejected() {
        let cell = SnapshotCell::default();
        cell.reset(1);
        assert!(cell.publish(1, Arc::new(Frame::blank(4, 4)), Some(Vec::new()), 1));
        assert_eq!(cell.snapshot().frame_number, 1);

        cell.reset(2);
        assert!(!cell.publish(1, Arc::new(Frame::blank(4, 4)), None, 2));
        let snapshot = cell.snapshot();
        assert!(snapshot.frame.is_none());
        assert_eq!(snapshot.frame_number, 0);
    }

    #[test]
    fn frame_only_publish_keeps_detections() {
        let cell = SnapshotCell::default();
        assert!(cell.publish(0, Arc::new(Frame::blank(2, 2)), None, 1));
        assert!(cell.detections().is_empty());
        assert!(cell.frame().is_some());
        assert!(cell.snapshot().published_at.is_some());
    }
}
