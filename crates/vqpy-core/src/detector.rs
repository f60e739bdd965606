//! Object detection backends: the `objects_in_frame` abstract operation.

use crate::frame::{Detection, Frame};
use crate::Result;
use std::collections::HashMap;

/// Trait for object detection inference backends.
///
/// Implement this to connect a detection model to the runtime. The returned
/// detections may carry upstream track ids; the tracker fills in the rest.
pub trait Detector: Send + Sync {
    /// Detect the objects in `frame`
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

impl<F> Detector for F
where
    F: Fn(&Frame) -> Result<Vec<Detection>> + Send + Sync,
{
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        self(frame)
    }
}

/// Replays pre-recorded detections (e.g. annotation files) by frame index.
///
/// Frames without recorded detections yield an empty list.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
}

impl ReplayDetector {
    /// Detector with no recorded frames
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the detections for one frame, replacing earlier ones
    pub fn insert(&mut self, frame_index: u64, detections: Vec<Detection>) {
        self.frames.insert(frame_index, detections);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_frame(mut self, frame_index: u64, detections: Vec<Detection>) -> Self {
        self.insert(frame_index, detections);
        self
    }

    /// Number of frames with recorded detections
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when no frame has recorded detections
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}
