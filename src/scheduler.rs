//! Frame Scheduler.
//!
//! Decides per frame whether to run the full detection path or the cheap
//! overlay refresh:
//!
//! - full path iff detection is enabled and at least `detection_interval` has
//!   passed since the last detection tick: decode → orient → detect →
//!   normalize → resolve → confidence filter → cache update + monitor;
//! - otherwise read the overlay cache (subject to staleness).
//!
//! Every frame is released on every path. Operator controls live on the
//! cloneable `DetectionControl`; disabling detection synchronously clears the
//! overlay, resets the monitor, and clears any alert. Results of a detection
//! that finishes after a disable (or an input-source switch) are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::alert::{AlertCoordinator, AlertState};
use crate::detect::{Detection, DetectionNormalizer, DetectorBackend};
use crate::frame::{Frame, InputSource};
use crate::ingest::{normalize_to_rgb, orient_rgb};
use crate::monitor::{
    ConditionSettings, SustainedConditionMonitor, SustainedConditionState, Transition,
};
use crate::overlay::{OverlayCache, OverlayCacheEntry};
use crate::resolve::{resolve, retain_confident};
use crate::Timestamp;

pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    /// Minimum time between detection ticks.
    pub detection_interval: Duration,
    /// Whether detection starts enabled.
    pub detection_enabled: bool,
    pub input_source: InputSource,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            detection_enabled: true,
            input_source: InputSource::Rear,
        }
    }
}

/// What happened to one frame.
#[derive(Clone, Debug)]
pub enum FrameOutcome {
    /// Detector ran; cache updated and monitor evaluated.
    Detected {
        detections: usize,
        transition: Transition,
    },
    /// Detector ran but detection was disabled or the input source switched
    /// before the result could be applied.
    Discarded,
    /// Detector returned an error; nothing was updated.
    DetectorFailed,
    /// Frame could not be decoded; skipped.
    InputRejected,
    /// Cheap path: overlay refreshed from cache.
    Refreshed {
        overlay: Option<Arc<OverlayCacheEntry>>,
    },
}

impl FrameOutcome {
    pub fn ran_detector(&self) -> bool {
        matches!(
            self,
            FrameOutcome::Detected { .. } | FrameOutcome::Discarded | FrameOutcome::DetectorFailed
        )
    }
}

// ----------------------------------------------------------------------------
// Operator controls
// ----------------------------------------------------------------------------

struct ControlState {
    enabled: bool,
    input_source: InputSource,
    monitor: SustainedConditionMonitor,
}

/// Operator and render-side surface of the pipeline.
///
/// Cheap to clone; every clone controls the same pipeline.
#[derive(Clone)]
pub struct DetectionControl {
    state: Arc<Mutex<ControlState>>,
    cache: Arc<OverlayCache>,
    alerts: Arc<AlertCoordinator>,
}

impl DetectionControl {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable or disable detection.
    ///
    /// Disabling clears the overlay, resets the monitor to Idle and clears the
    /// alert before returning. Repeated disables make no further effect calls.
    pub fn set_detection_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        if enabled {
            if !state.enabled {
                log::info!("detection enabled");
            }
            state.enabled = true;
            return;
        }
        if state.enabled {
            log::info!("detection disabled");
        }
        state.enabled = false;
        self.cache.clear();
        state.monitor.reset(&self.alerts);
    }

    pub fn is_detection_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Flip between rear and front camera. Clears the overlay.
    pub fn switch_input_source(&self) -> InputSource {
        let mut state = self.lock();
        state.input_source = state.input_source.toggled();
        self.cache.clear();
        log::info!("input source switched to {:?}", state.input_source);
        state.input_source
    }

    pub fn input_source(&self) -> InputSource {
        self.lock().input_source
    }

    pub fn overlay_snapshot(&self, now: Timestamp) -> Option<Arc<OverlayCacheEntry>> {
        self.cache.read(now)
    }

    /// Drop the overlay if it has gone stale. Returns true when one was dropped.
    pub fn sweep_overlay(&self, now: Timestamp) -> bool {
        self.cache.sweep(now)
    }

    pub fn alert_state(&self) -> AlertState {
        self.alerts.state()
    }

    /// Pending operator advisory (e.g. notification permission denied).
    pub fn take_advisory(&self) -> Option<String> {
        self.alerts.take_advisory()
    }

    pub fn monitor_state(&self) -> SustainedConditionState {
        self.lock().monitor.state()
    }

    fn snapshot(&self) -> (bool, InputSource) {
        let state = self.lock();
        (state.enabled, state.input_source)
    }

    /// Apply a detection result, unless the operator changed state meanwhile.
    fn commit(
        &self,
        detections: Vec<Detection>,
        frame_dims: (u32, u32),
        source: InputSource,
        now: Timestamp,
    ) -> FrameOutcome {
        let mut state = self.lock();
        if !state.enabled || state.input_source != source {
            log::debug!("detection result discarded: controls changed mid-frame");
            return FrameOutcome::Discarded;
        }
        let transition = state.monitor.evaluate(&detections, now, &self.alerts);
        let count = detections.len();
        self.cache.update(detections, frame_dims, now);
        FrameOutcome::Detected {
            detections: count,
            transition,
        }
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

pub struct FrameScheduler {
    detection_interval: Duration,
    confidence_threshold: f32,
    detector: Box<dyn DetectorBackend>,
    normalizer: DetectionNormalizer,
    last_detection: Option<Timestamp>,
    control: DetectionControl,
}

impl FrameScheduler {
    pub fn new(
        settings: SchedulerSettings,
        condition: ConditionSettings,
        detector: Box<dyn DetectorBackend>,
        cache: Arc<OverlayCache>,
        alerts: Arc<AlertCoordinator>,
    ) -> Self {
        let confidence_threshold = condition.confidence_threshold;
        let control = DetectionControl {
            state: Arc::new(Mutex::new(ControlState {
                enabled: settings.detection_enabled,
                input_source: settings.input_source,
                monitor: SustainedConditionMonitor::new(condition),
            })),
            cache,
            alerts,
        };
        Self {
            detection_interval: settings.detection_interval,
            confidence_threshold,
            detector,
            normalizer: DetectionNormalizer::new(),
            last_detection: None,
            control,
        }
    }

    pub fn control(&self) -> DetectionControl {
        self.control.clone()
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.detector.warm_up()
    }

    /// Process one frame and release it.
    pub fn process_frame(&mut self, frame: Frame, now: Timestamp) -> FrameOutcome {
        let (enabled, source) = self.control.snapshot();
        let due = self
            .last_detection
            .is_none_or(|last| now.since(last) >= self.detection_interval);

        let outcome = if enabled && due {
            self.last_detection = Some(now);
            self.run_detection(&frame, source, now)
        } else {
            FrameOutcome::Refreshed {
                overlay: self.control.overlay_snapshot(now),
            }
        };

        frame.release();
        outcome
    }

    fn run_detection(&mut self, frame: &Frame, source: InputSource, now: Timestamp) -> FrameOutcome {
        let oriented = normalize_to_rgb(frame.pixels(), frame.width, frame.height, frame.format)
            .and_then(|rgb| {
                orient_rgb(
                    &rgb,
                    frame.width,
                    frame.height,
                    frame.rotation,
                    source.mirrored(),
                )
            });
        let (rgb, width, height) = match oriented {
            Ok(oriented) => oriented,
            Err(err) => {
                log::warn!("frame rejected: {}", err);
                return FrameOutcome::InputRejected;
            }
        };

        let raw = match self.detector.detect(&rgb, width, height) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("detector {} failed: {:#}", self.detector.name(), err);
                return FrameOutcome::DetectorFailed;
            }
        };

        let normalized = self.normalizer.normalize(raw, width, height);
        let resolved = retain_confident(resolve(normalized), self.confidence_threshold);
        log::debug!("detection tick at {}: {} detections", now, resolved.len());
        self.control.commit(resolved, (width, height), source, now)
    }
}
