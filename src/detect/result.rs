use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle `(left, top, right, bottom)`.
///
/// `Detection` boxes live in the unit reference space (0..1 on both axes);
/// `RawDetection` boxes are in pixel coordinates of the oriented frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// True when the box encloses no area.
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    /// Non-empty overlap test. Boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Scale both axes, e.g. from reference space to display pixels.
    pub fn scale(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox {
            left: self.left * sx,
            top: self.top * sy,
            right: self.right * sx,
            bottom: self.bottom * sy,
        }
    }
}

/// Detector output for one object in one frame, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Canonical detection: label, confidence in `[0, 1]`, box in the reference space.
///
/// Produced by `DetectionNormalizer`; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Case-insensitive label comparison.
    pub fn is_label(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }

    /// Overlay caption, e.g. `microsleep: 0.90`.
    pub fn caption(&self) -> String {
        format!("{}: {:.2}", self.label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_touching_boxes_do_not_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let right = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        let below = BoundingBox::new(0.0, 10.0, 10.0, 20.0);
        assert!(!a.intersects(&right));
        assert!(!a.intersects(&below));
    }

    #[test]
    fn overlapping_boxes_intersect_symmetrically() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(9.0, 9.0, 12.0, 12.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn contained_box_intersects() {
        let outer = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let inner = BoundingBox::new(0.25, 0.25, 0.5, 0.5);
        assert!(outer.intersects(&inner));
    }

    #[test]
    fn caption_formats_two_decimals() {
        let d = Detection::new("microsleep", 0.9, BoundingBox::new(0.0, 0.0, 0.1, 0.1));
        assert_eq!(d.caption(), "microsleep: 0.90");
        assert!(d.is_label("MicroSleep"));
        assert!(!d.is_label("awake"));
    }
}
