//! Cross-frame object identity.
//!
//! The tracker turns per-frame detections into [`VObj`]s with stable track
//! ids, which is what makes two observations "the same object".

use crate::frame::{BBox, Detection, Frame, VObj};
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// Assigns track ids to the detections of consecutive frames
pub trait Tracker: Send {
    /// Turn one frame's detections into objects.
    ///
    /// Called once per frame, in frame order. Two objects of the same frame
    /// must never share a track id.
    fn assign(&mut self, frame: &Frame, detections: Vec<Detection>) -> Vec<VObj>;
}

#[derive(Debug, Clone)]
struct Track {
    bbox: BBox,
    label: String,
    last_seen: u64,
}

/// Greedy IoU tracker.
///
/// Detections that already carry a track id keep it. The rest are matched to
/// live tracks of the same label, best IoU first; a match needs
/// `iou >= iou_threshold`. Unmatched detections open new tracks. Ids start at
/// 1 and are never reused. Once the id space is used up (an upstream id of
/// `u64::MAX`), detections without an id are dropped.
#[derive(Debug, Clone)]
pub struct IouTracker {
    iou_threshold: f32,
    max_idle_frames: u64,
    /// `None` once every id has been handed out
    next_id: Option<u64>,
    tracks: BTreeMap<u64, Track>,
}

impl IouTracker {
    /// Tracker matching at `iou >= iou_threshold` that retires tracks unseen
    /// for more than `max_idle_frames` frames
    pub fn new(iou_threshold: f32, max_idle_frames: u64) -> Self {
        Self {
            iou_threshold,
            max_idle_frames,
            next_id: Some(1),
            tracks: BTreeMap::new(),
        }
    }

    /// Number of live tracks
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Keep `id` out of the pool of fresh ids
    fn reserve(&mut self, id: u64) {
        if let Some(next) = self.next_id {
            if id >= next {
                self.next_id = id.checked_add(1);
            }
        }
    }

    fn allocate(&mut self) -> Option<u64> {
        let id = self.next_id?;
        self.next_id = id.checked_add(1);
        Some(id)
    }

    fn touch(&mut self, id: u64, detection: &Detection, frame: u64) {
        self.tracks.insert(
            id,
            Track {
                bbox: detection.bbox,
                label: detection.label.clone(),
                last_seen: frame,
            },
        );
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_IOU_THRESHOLD,
            crate::config::DEFAULT_MAX_TRACK_IDLE_FRAMES,
        )
    }
}

impl Tracker for IouTracker {
    fn assign(&mut self, frame: &Frame, detections: Vec<Detection>) -> Vec<VObj> {
        let mut ids: Vec<Option<u64>> = detections.iter().map(|d| d.track_id).collect();

        // Upstream ids claim their tracks first
        let mut claimed: Vec<u64> = ids.iter().flatten().copied().collect();

        let mut candidates = Vec::new();
        for (i, detection) in detections.iter().enumerate() {
            if ids[i].is_some() {
                continue;
            }
            for (id, track) in &self.tracks {
                if track.label != detection.label || claimed.contains(id) {
                    continue;
                }
                let iou = detection.bbox.iou(&track.bbox);
                if iou >= self.iou_threshold && iou > 0.0 {
                    candidates.push((iou, i, *id));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (_, i, id) in candidates {
            if ids[i].is_none() && !claimed.contains(&id) {
                ids[i] = Some(id);
                claimed.push(id);
            }
        }

        // Fresh ids go past every id present in this frame
        for id in &claimed {
            self.reserve(*id);
        }

        let mut objects = Vec::with_capacity(detections.len());
        for (detection, id) in detections.into_iter().zip(ids) {
            let id = match id {
                Some(id) => id,
                None => match self.allocate() {
                    Some(id) => {
                        trace!(track_id = id, label = %detection.label, "Opened track");
                        id
                    }
                    None => {
                        warn!(label = %detection.label, "Track ids exhausted, dropping detection");
                        continue;
                    }
                },
            };
            self.touch(id, &detection, frame.index);
            objects.push(VObj::from_detection(detection, id, frame));
        }

        let max_idle = self.max_idle_frames;
        self.tracks
            .retain(|_, t| frame.index.saturating_sub(t.last_seen) <= max_idle);

        objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x: f32) -> Detection {
        Detection::new(BBox::new(x, 0.0, x + 10.0, 10.0), "car", 0.9)
    }

    #[test]
    fn test_ids_persist_across_frames() {
        let mut tracker = IouTracker::new(0.3, 5);

        let first = tracker.assign(&Frame::new(0, 0.0), vec![car(0.0), car(100.0)]);
        assert_eq!(first[0].track_id, 1);
        assert_eq!(first[1].track_id, 2);

        // Moved slightly, listed in the opposite order
        let second = tracker.assign(&Frame::new(1, 0.1), vec![car(101.0), car(1.0)]);
        assert_eq!(second[0].track_id, 2);
        assert_eq!(second[1].track_id, 1);
        assert_eq!(tracker.active_tracks(), 2);
    }

    #[test]
    fn test_labels_do_not_match() {
        let mut tracker = IouTracker::new(0.3, 5);
        tracker.assign(&Frame::new(0, 0.0), vec![car(0.0)]);

        let person = Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), "person", 0.8);
        let objects = tracker.assign(&Frame::new(1, 0.1), vec![person]);
        assert_eq!(objects[0].track_id, 2);
    }

    #[test]
    fn test_upstream_ids_are_kept() {
        let mut tracker = IouTracker::new(0.3, 5);
        let objects = tracker.assign(
            &Frame::new(0, 0.0),
            vec![car(0.0).with_track_id(40), car(100.0)],
        );
        assert_eq!(objects[0].track_id, 40);
        // New ids never collide with upstream ones
        assert_eq!(objects[1].track_id, 41);
    }

    #[test]
    fn test_idle_tracks_retire_and_ids_are_not_reused() {
        let mut tracker = IouTracker::new(0.3, 2);
        tracker.assign(&Frame::new(0, 0.0), vec![car(0.0)]);
        tracker.assign(&Frame::new(1, 0.1), vec![]);
        tracker.assign(&Frame::new(5, 0.5), vec![]);
        assert_eq!(tracker.active_tracks(), 0);

        let objects = tracker.assign(&Frame::new(6, 0.6), vec![car(0.0)]);
        assert_eq!(objects[0].track_id, 2);
    }

    #[test]
    fn test_new_ids_skip_later_upstream_ids() {
        let mut tracker = IouTracker::new(0.3, 5);
        let objects = tracker.assign(
            &Frame::new(0, 0.0),
            vec![car(100.0), car(0.0).with_track_id(1), car(200.0)],
        );
        let ids: Vec<u64> = objects.iter().map(|o| o.track_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        let next = tracker.assign(&Frame::new(1, 0.1), vec![car(500.0)]);
        assert_eq!(next[0].track_id, 4);
    }

    #[test]
    fn test_upstream_max_id_exhausts_ids() {
        let mut tracker = IouTracker::new(0.3, 5);
        let objects = tracker.assign(
            &Frame::new(0, 0.0),
            vec![car(0.0).with_track_id(u64::MAX), car(100.0)],
        );
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].track_id, u64::MAX);

        // The upstream object is still followed
        let objects = tracker.assign(&Frame::new(1, 0.1), vec![car(0.0).with_track_id(u64::MAX)]);
        assert_eq!(objects[0].track_id, u64::MAX);
        assert_eq!(tracker.active_tracks(), 1);
    }

    #[test]
    fn test_one_track_per_detection() {
        let mut tracker = IouTracker::new(0.1, 5);
        tracker.assign(&Frame::new(0, 0.0), vec![car(0.0)]);

        // Two overlapping detections compete for track 1; the better one wins
        let objects = tracker.assign(&Frame::new(1, 0.1), vec![car(4.0), car(1.0)]);
        assert_eq!(objects[1].track_id, 1);
        assert_eq!(objects[0].track_id, 2);
    }
}
