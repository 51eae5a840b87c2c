//! Overlap Resolver.
//!
//! Greedy, first-match de-duplication of spatially overlapping detections.
//! Candidates are visited in input order; each one is compared only against
//! the first already-kept detection it intersects. Overlap chains are not
//! merged transitively: `A∩B` and `B∩C` with `A` disjoint from `C` can keep
//! both `A` and `C`, or `B` alone, depending on order.

use crate::detect::Detection;

/// De-duplicate one frame's detections.
///
/// For each candidate, the first kept detection whose box intersects it is
/// replaced in place when the candidate is strictly more confident; otherwise
/// the candidate is discarded. Candidates that intersect nothing are appended.
pub fn resolve(detections: Vec<Detection>) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        match kept
            .iter()
            .position(|existing| existing.bbox.intersects(&candidate.bbox))
        {
            Some(idx) => {
                if candidate.confidence > kept[idx].confidence {
                    kept[idx] = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }
    kept
}

/// Keep detections with confidence strictly above `threshold`, in order.
pub fn retain_confident(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.confidence > threshold);
    detections
}
