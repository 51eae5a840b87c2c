//! Detection Normalizer.
//!
//! Converts raw detector output (pixel coordinates of the oriented frame) into
//! canonical `Detection`s in the unit reference space. Confidence filtering is
//! left to the consumers; this stage only sanitizes.

use crate::detect::result::{BoundingBox, Detection, RawDetection};

#[derive(Clone, Copy, Debug, Default)]
pub struct DetectionNormalizer;

impl DetectionNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one frame's raw detections, preserving input order.
    ///
    /// Drops detections with non-finite values, empty labels, or boxes that are
    /// empty once clamped to the frame. A zero-sized frame yields nothing.
    pub fn normalize(
        &self,
        raw: Vec<RawDetection>,
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<Detection> {
        if frame_width == 0 || frame_height == 0 {
            if !raw.is_empty() {
                log::debug!("normalizer: dropping {} detections for empty frame", raw.len());
            }
            return Vec::new();
        }
        let fw = frame_width as f32;
        let fh = frame_height as f32;

        raw.into_iter()
            .filter_map(|det| {
                if !det.confidence.is_finite() || !det.bbox.is_finite() {
                    log::debug!("normalizer: dropping non-finite detection {:?}", det.label);
                    return None;
                }
                let label = det.label.trim();
                if label.is_empty() {
                    return None;
                }
                let b = det.bbox;
                let unit = BoundingBox::new(
                    b.left.min(b.right).clamp(0.0, fw) / fw,
                    b.top.min(b.bottom).clamp(0.0, fh) / fh,
                    b.left.max(b.right).clamp(0.0, fw) / fw,
                    b.top.max(b.bottom).clamp(0.0, fh) / fh,
                );
                if unit.is_empty() {
                    return None;
                }
                Some(Detection::new(label, det.confidence.clamp(0.0, 1.0), unit))
            })
            .collect()
    }
}
