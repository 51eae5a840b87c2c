//! Frame ingestion sources.
//!
//! This module provides sources for decoded frames:
//! - Synthetic source (`stub://` URLs) for demos and tests
//! - Local image directories (feature: ingest-image)
//!
//! Camera session management is an external collaborator; these sources stand
//! in for it. All sources produce `Frame` instances that flow into the
//! pipeline worker. The ingestion layer is responsible for:
//! - Stamping each frame with its capture time
//! - Reporting sensor rotation
//! - Pacing frames at the target rate
//!
//! Pixel format conversion and orientation live in `normalize` and run on the
//! worker, only on detection ticks.

#[cfg(feature = "ingest-image")]
pub mod image_dir;
mod normalize;
pub mod synthetic;

#[cfg(feature = "ingest-image")]
pub use image_dir::ImageDirSource;
pub use normalize::{normalize_to_rgb, orient_rgb, PixelFormat};
pub use synthetic::SyntheticSource;

use std::time::Duration;

/// Interval between frames for a target rate. Zero fps means unpaced.
pub fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}
