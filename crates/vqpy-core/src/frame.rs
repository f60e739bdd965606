//! Video frames and the objects detected in them.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge
    pub x1: f32,
    /// Top edge
    pub y1: f32,
    /// Right edge
    pub x2: f32,
    /// Bottom edge
    pub y2: f32,
}

impl BBox {
    /// Creates a box from its corner coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Creates a box from a center point and size.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    /// Width, zero for inverted boxes.
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Height, zero for inverted boxes.
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Area of the box, zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point as `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Intersection over union. Returns 0 when the union is empty.
    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &BBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// Raw detector output for one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Object location
    pub bbox: BBox,
    /// Class label such as `car`
    pub label: String,
    /// Detector confidence
    pub score: f32,
    /// Identity assigned upstream (e.g. by a detector with built-in tracking)
    pub track_id: Option<u64>,
}

impl Detection {
    /// Creates an untracked detection.
    pub fn new<L: Into<String>>(bbox: BBox, label: L, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
            track_id: None,
        }
    }

    /// Attach an upstream track id.
    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// A single decoded video frame.
///
/// `data` is opaque to the runtime; only bound models interpret it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Position in the stream; must increase within a session
    pub index: u64,
    /// Presentation time in seconds
    pub timestamp: f64,
    /// Width in pixels, zero when unknown
    pub width: u32,
    /// Height in pixels, zero when unknown
    pub height: u32,
    /// Encoded or raw image bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Creates an empty frame with the given index and timestamp.
    pub fn new(index: u64, timestamp: f64) -> Self {
        Self {
            index,
            timestamp,
            ..Default::default()
        }
    }

    /// Sets the frame dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Attaches image bytes.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

/// A tracked video object: a detection with a stable identity.
///
/// Two objects denote the same real-world entity across frames iff their
/// `track_id`s are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VObj {
    /// Stable identity across frames
    pub track_id: u64,
    /// Frame the object was observed in
    pub frame_index: u64,
    /// Timestamp of that frame
    pub timestamp: f64,
    /// Location in that frame
    pub bbox: BBox,
    /// Detector label
    pub label: String,
    /// Detector confidence
    pub score: f32,
}

impl VObj {
    /// Binds a detection to a frame under the given identity.
    pub fn from_detection(detection: Detection, track_id: u64, frame: &Frame) -> Self {
        Self {
            track_id,
            frame_index: frame.index,
            timestamp: frame.timestamp,
            bbox: detection.bbox,
            label: detection.label,
            score: detection.score,
        }
    }
}

impl PartialEq for VObj {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}

impl Eq for VObj {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let b = BBox::new(0.0, 0.0, 10.0, 20.0);
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 20.0);
        assert_eq!(b.area(), 200.0);
        assert_eq!(b.center(), (5.0, 10.0));

        let c = BBox::from_cxcywh(5.0, 10.0, 10.0, 20.0);
        assert_eq!(b, c);
    }

    #[test]
    fn test_degenerate_box() {
        let b = BBox::new(10.0, 10.0, 5.0, 5.0);
        assert_eq!(b.area(), 0.0);
        assert_eq!(b.iou(&b), 0.0);
    }

    #[test]
    fn test_iou() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        let iou = a.iou(&b);
        assert!((iou - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }

    #[test]
    fn test_center_distance() {
        let a = BBox::from_cxcywh(0.0, 0.0, 2.0, 2.0);
        let b = BBox::from_cxcywh(3.0, 4.0, 2.0, 2.0);
        assert!((a.center_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_vobj_identity_is_track_id() {
        let frame = Frame::new(1, 0.0);
        let a = VObj::from_detection(
            Detection::new(BBox::new(0.0, 0.0, 1.0, 1.0), "car", 0.9),
            7,
            &frame,
        );
        let mut b = a.clone();
        b.bbox = BBox::new(5.0, 5.0, 6.0, 6.0);
        assert_eq!(a, b);
        b.track_id = 8;
        assert_ne!(a, b);
    }
}
