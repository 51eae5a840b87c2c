//! Alert Effect Coordinator.
//!
//! Owns the two externally visible alert effects, the notification and the
//! looping sound, and guarantees at most one active instance of each no matter
//! how often `raise`/`clear` are called. The sound handle never leaves this
//! module; no other component can start or stop playback.
//!
//! Effect failures degrade gracefully: a denied notification produces one
//! user-visible advisory per alert episode and does not block the sound; a
//! sound that cannot be acquired is logged and the alert continues silently.

mod terminal;

pub use terminal::TerminalAlertEffects;

use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Advisory surfaced to the operator when notifications are not permitted.
pub const NOTIFICATION_DENIED_ADVISORY: &str =
    "Notification permission denied. Microsleep warnings will not appear.";

/// Failures reported by alert delivery collaborators.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("audio resource unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("alert effect unavailable: {0}")]
    Unavailable(String),
}

/// Opaque handle to a playing looped sound, issued by the collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoundHandle(u64);

impl SoundHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Notification and sound collaborators.
///
/// Implementations perform the side effect and nothing else; idempotency is
/// the coordinator's job.
pub trait AlertEffects: Send {
    fn post_notification(&mut self, title: &str, body: &str) -> Result<(), AlertError>;

    fn start_looping_sound(&mut self) -> Result<SoundHandle, AlertError>;

    fn stop_sound(&mut self, handle: SoundHandle);
}

/// Observable alert status for the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AlertState {
    pub notification_active: bool,
    pub sound_active: bool,
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        self.notification_active || self.sound_active
    }
}

/// Notification text.
#[derive(Clone, Debug)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}

impl Default for AlertMessage {
    fn default() -> Self {
        Self {
            title: "Microsleep Detected".to_string(),
            body: "Warning: sustained microsleep detected!".to_string(),
        }
    }
}

struct CoordinatorInner {
    effects: Box<dyn AlertEffects>,
    state: AlertState,
    sound: Option<SoundHandle>,
    // Per-episode failure memory; reset by `clear`.
    notification_denied: bool,
    sound_failed: bool,
    advisory: Option<String>,
}

pub struct AlertCoordinator {
    message: AlertMessage,
    inner: Mutex<CoordinatorInner>,
}

impl AlertCoordinator {
    pub fn new(effects: Box<dyn AlertEffects>, message: AlertMessage) -> Self {
        Self {
            message,
            inner: Mutex::new(CoordinatorInner {
                effects,
                state: AlertState::default(),
                sound: None,
                notification_denied: false,
                sound_failed: false,
                advisory: None,
            }),
        }
    }

    /// Start whichever effects are not already active.
    ///
    /// Safe to call on every qualifying tick: active effects are left alone,
    /// and an effect that failed in this episode is not retried until `clear`.
    pub fn raise(&self) -> AlertState {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *inner;

        if !inner.state.notification_active && !inner.notification_denied {
            match inner
                .effects
                .post_notification(&self.message.title, &self.message.body)
            {
                Ok(()) => {
                    inner.state.notification_active = true;
                    log::warn!("alert: {} ({})", self.message.title, self.message.body);
                }
                Err(AlertError::PermissionDenied) => {
                    inner.notification_denied = true;
                    inner.advisory = Some(NOTIFICATION_DENIED_ADVISORY.to_string());
                    log::warn!("alert: notification permission denied; continuing without it");
                }
                Err(err) => {
                    inner.notification_denied = true;
                    log::warn!("alert: notification failed: {}", err);
                }
            }
        }

        if !inner.state.sound_active && !inner.sound_failed {
            match inner.effects.start_looping_sound() {
                Ok(handle) => {
                    inner.sound = Some(handle);
                    inner.state.sound_active = true;
                    log::info!("alert: looping sound started");
                }
                Err(err) => {
                    inner.sound_failed = true;
                    log::warn!("alert: sound unavailable, continuing silently: {}", err);
                }
            }
        }

        inner.state
    }

    /// Stop the sound if it is playing and mark every effect inactive.
    ///
    /// Notifications auto-dismiss; no collaborator call is made for them. A
    /// clear while nothing is active makes no collaborator call at all.
    pub fn clear(&self) -> AlertState {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *inner;

        if let Some(handle) = inner.sound.take() {
            inner.effects.stop_sound(handle);
            log::info!("alert: looping sound stopped");
        }
        if inner.state.is_active() {
            log::info!("alert: cleared");
        }
        inner.state = AlertState::default();
        inner.notification_denied = false;
        inner.sound_failed = false;
        inner.state
    }

    pub fn state(&self) -> AlertState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Pending user-visible advisory, if any. Returned once.
    pub fn take_advisory(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advisory
            .take()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Counts of collaborator calls.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct EffectLog {
        pub notifications: usize,
        pub sound_starts: usize,
        pub sound_stops: usize,
    }

    /// Recording fake with configurable failures.
    pub struct RecordingEffects {
        pub log: Arc<Mutex<EffectLog>>,
        pub deny_notifications: bool,
        pub fail_sound: bool,
        next_id: u64,
    }

    impl RecordingEffects {
        pub fn new() -> (Self, Arc<Mutex<EffectLog>>) {
            let log = Arc::new(Mutex::new(EffectLog::default()));
            (
                Self {
                    log: log.clone(),
                    deny_notifications: false,
                    fail_sound: false,
                    next_id: 0,
                },
                log,
            )
        }
    }

    impl AlertEffects for RecordingEffects {
        fn post_notification(&mut self, _title: &str, _body: &str) -> Result<(), AlertError> {
            if self.deny_notifications {
                return Err(AlertError::PermissionDenied);
            }
            self.log.lock().unwrap().notifications += 1;
            Ok(())
        }

        fn start_looping_sound(&mut self) -> Result<SoundHandle, AlertError> {
            if self.fail_sound {
                return Err(AlertError::Unavailable("device busy".into()));
            }
            self.next_id += 1;
            self.log.lock().unwrap().sound_starts += 1;
            Ok(SoundHandle::new(self.next_id))
        }

        fn stop_sound(&mut self, _handle: SoundHandle) {
            self.log.lock().unwrap().sound_stops += 1;
        }
    }

    pub fn recording_coordinator() -> (AlertCoordinator, Arc<Mutex<EffectLog>>) {
        let (effects, log) = RecordingEffects::new();
        (
            AlertCoordinator::new(Box::new(effects), AlertMessage::default()),
            log,
        )
    }
}
