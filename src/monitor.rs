//! Sustained-Condition Monitor.
//!
//! Tracks continuous presence of one designated class across detection ticks.
//! Timing starts on the first tick the class is present, the alert is raised
//! on the first later tick at least `trigger_threshold` after that start, and
//! a single tick without the class resets the timer and clears any active
//! alert. There is no grace period for missed frames.

use std::time::Duration;

use crate::alert::AlertCoordinator;
use crate::detect::Detection;
use crate::Timestamp;

pub const DEFAULT_CONDITION_LABEL: &str = "microsleep";
pub const DEFAULT_TRIGGER_THRESHOLD: Duration = Duration::from_millis(5000);
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct ConditionSettings {
    /// Designated class, compared case-insensitively.
    pub label: String,
    /// Detections count only when strictly more confident than this.
    pub confidence_threshold: f32,
    pub trigger_threshold: Duration,
}

impl Default for ConditionSettings {
    fn default() -> Self {
        Self {
            label: DEFAULT_CONDITION_LABEL.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            trigger_threshold: DEFAULT_TRIGGER_THRESHOLD,
        }
    }
}

/// `condition_started_at` is `Some` iff the class was present on every
/// evaluated tick since that time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SustainedConditionState {
    pub active: bool,
    pub condition_started_at: Option<Timestamp>,
}

/// Outcome of one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Absent, and was not being timed.
    Idle,
    /// Present for the first tick; timing started.
    Started,
    /// Present and still timing, or already alerting.
    Sustaining,
    /// Threshold crossed; alert raised.
    Raised,
    /// Absent after timing had started but before the alert fired.
    Lapsed,
    /// Absent while alerting; alert cleared.
    Cleared,
}

pub struct SustainedConditionMonitor {
    settings: ConditionSettings,
    state: SustainedConditionState,
}

impl SustainedConditionMonitor {
    pub fn new(settings: ConditionSettings) -> Self {
        Self {
            settings,
            state: SustainedConditionState::default(),
        }
    }

    pub fn settings(&self) -> &ConditionSettings {
        &self.settings
    }

    pub fn state(&self) -> SustainedConditionState {
        self.state
    }

    /// True when the designated class appears above the confidence threshold.
    pub fn is_present(&self, detections: &[Detection]) -> bool {
        detections.iter().any(|d| {
            d.confidence > self.settings.confidence_threshold && d.is_label(&self.settings.label)
        })
    }

    /// Evaluate one detection tick.
    pub fn evaluate(
        &mut self,
        detections: &[Detection],
        now: Timestamp,
        alerts: &AlertCoordinator,
    ) -> Transition {
        if self.is_present(detections) {
            let Some(started) = self.state.condition_started_at else {
                self.state.condition_started_at = Some(now);
                log::debug!("monitor: {} present, timing from {}", self.settings.label, now);
                return Transition::Started;
            };
            if !self.state.active && now.since(started) >= self.settings.trigger_threshold {
                self.state.active = true;
                log::warn!(
                    "monitor: {} sustained for {} ms, raising alert",
                    self.settings.label,
                    now.since(started).as_millis()
                );
                alerts.raise();
                return Transition::Raised;
            }
            return Transition::Sustaining;
        }

        let was_timing = self.state.condition_started_at.take().is_some();
        if self.state.active {
            self.state.active = false;
            log::info!("monitor: {} no longer present, clearing alert", self.settings.label);
            alerts.clear();
            Transition::Cleared
        } else if was_timing {
            Transition::Lapsed
        } else {
            Transition::Idle
        }
    }

    /// Force Idle and clear any alert (detection disabled).
    pub fn reset(&mut self, alerts: &AlertCoordinator) {
        self.state = SustainedConditionState::default();
        alerts.clear();
    }
}

impl Default for SustainedConditionMonitor {
    fn default() -> Self {
        Self::new(ConditionSettings::default())
    }
}
