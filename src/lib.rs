//! Microsleep Kernel
//!
//! This crate implements the temporal detection-and-alert pipeline that sits
//! between a camera feed and a driver-facing display.
//!
//! # Architecture
//!
//! Frames flow through a single serialized worker:
//!
//! 1. **Frame Scheduler** decides per frame whether to run the detector or to
//!    refresh the overlay from cache (rate limiting).
//! 2. **Detection Normalizer** maps raw detector output into the unit reference space.
//! 3. **Overlap Resolver** keeps the most confident detection per overlapping pair.
//! 4. **Overlay Cache** holds the latest resolved set with bounded staleness.
//! 5. **Sustained-Condition Monitor** tracks continuous presence of the
//!    designated class and raises/clears the alarm.
//! 6. **Alert Effect Coordinator** owns the notification and looping sound,
//!    starting and stopping each at most once per alert episode.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames with explicit release, input source/orientation
//! - `ingest`: frame sources and pixel normalization
//! - `detect`: detections, detector backends, normalizer
//! - `resolve`, `overlay`, `monitor`, `alert`: the temporal core
//! - `scheduler`, `pipeline`: per-frame decisions and the worker threads

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod alert;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod overlay;
pub mod pipeline;
pub mod resolve;
pub mod scheduler;

pub use alert::{
    AlertCoordinator, AlertEffects, AlertError, AlertMessage, AlertState, SoundHandle,
    TerminalAlertEffects,
};
pub use config::KernelSettings;
pub use detect::{
    BoundingBox, Detection, DetectionNormalizer, DetectorBackend, RawDetection, ScriptedBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::{Frame, InputSource, Rotation};
#[cfg(feature = "ingest-image")]
pub use ingest::{image_dir::ImageDirConfig, ImageDirSource};
pub use ingest::{synthetic::SyntheticConfig, PixelFormat, SyntheticSource};
pub use monitor::{ConditionSettings, SustainedConditionMonitor, SustainedConditionState, Transition};
pub use overlay::{OverlayCache, OverlayCacheEntry, DEFAULT_STALENESS_WINDOW};
pub use pipeline::{
    LogRenderer, OverlayRenderer, Pipeline, PipelineHandle, PipelineSettings, PipelineStats,
};
pub use resolve::{resolve, retain_confident};
pub use scheduler::{DetectionControl, FrameOutcome, FrameScheduler, SchedulerSettings};

// -------------------- Timestamps --------------------

/// Wall-clock instant in milliseconds since the UNIX epoch.
///
/// All staleness and persistence decisions are pure functions of two
/// timestamps, so tests drive the pipeline with synthetic values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub epoch_ms: u64,
}

impl Timestamp {
    pub const fn from_millis(epoch_ms: u64) -> Self {
        Self { epoch_ms }
    }

    /// Current wall-clock time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self { epoch_ms }
    }

    /// Time elapsed since `earlier`, saturating at zero if the clock stepped back.
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.epoch_ms.saturating_sub(earlier.epoch_ms))
    }

    pub fn plus(self, delta: Duration) -> Self {
        Self {
            epoch_ms: self.epoch_ms.saturating_add(delta.as_millis() as u64),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.epoch_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_saturates_when_clock_steps_back() {
        let later = Timestamp::from_millis(1_000);
        let earlier = Timestamp::from_millis(400);
        assert_eq!(later.since(earlier), Duration::from_millis(600));
        assert_eq!(earlier.since(later), Duration::ZERO);
    }

    #[test]
    fn plus_advances_by_duration() {
        let t = Timestamp::from_millis(250).plus(Duration::from_millis(750));
        assert_eq!(t, Timestamp::from_millis(1_000));
    }
}
