//! Engine configuration shared by the compiler, tracker and executor.

use serde::{Deserialize, Serialize};

/// Default upper bound for `HISTORY(n)`
pub const DEFAULT_MAX_HISTORY_LENGTH: usize = 1024;

/// Default number of frames a track may go unobserved before it is retired
pub const DEFAULT_MAX_TRACK_IDLE_FRAMES: u64 = 30;

/// Default IoU needed to continue a track
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest history length a program may declare
    pub max_history_length: usize,
    /// Frames without an observation before a track and its history are dropped
    pub max_track_idle_frames: u64,
    /// Association threshold of the built-in IoU tracker
    pub iou_threshold: f32,
    /// Cache model results within a frame
    pub memoize_models: bool,
    /// Reject model results that do not match the declared return type
    pub strict_model_types: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            max_track_idle_frames: DEFAULT_MAX_TRACK_IDLE_FRAMES,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            memoize_models: true,
            strict_model_types: true,
        }
    }
}

impl EngineConfig {
    /// Set the largest accepted `HISTORY(n)`
    pub fn with_max_history_length(mut self, length: usize) -> Self {
        self.max_history_length = length;
        self
    }

    /// Set how long a track survives without observations
    pub fn with_max_track_idle_frames(mut self, frames: u64) -> Self {
        self.max_track_idle_frames = frames;
        self
    }

    /// Set the IoU tracker's association threshold
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Enable or disable per-frame model caching
    pub fn with_memoize_models(mut self, enabled: bool) -> Self {
        self.memoize_models = enabled;
        self
    }

    /// Enable or disable return type checks on model results
    pub fn with_strict_model_types(mut self, enabled: bool) -> Self {
        self.strict_model_types = enabled;
        self
    }

    /// Check that the values are usable
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_history_length == 0 {
            return Err(crate::Error::InvalidOperation(
                "max_history_length must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(crate::Error::InvalidOperation(format!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        Ok(())
    }
}
