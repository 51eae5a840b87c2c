//! Terminal alert effects for the daemon.
//!
//! Notifications are written to the log at WARN; the looping sound is a
//! background thread ringing the terminal bell until stopped. When a sound
//! file is configured it must be readable, mirroring the asset acquisition a
//! media player performs before playback.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{AlertEffects, AlertError, SoundHandle};

const DEFAULT_BELL_PERIOD: Duration = Duration::from_millis(700);
const STOP_POLL: Duration = Duration::from_millis(20);

struct BellLoop {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

pub struct TerminalAlertEffects {
    notifications_enabled: bool,
    sound_path: Option<PathBuf>,
    bell_period: Duration,
    next_id: u64,
    loops: HashMap<SoundHandle, BellLoop>,
}

impl TerminalAlertEffects {
    pub fn new(notifications_enabled: bool, sound_path: Option<PathBuf>) -> Self {
        Self {
            notifications_enabled,
            sound_path,
            bell_period: DEFAULT_BELL_PERIOD,
            next_id: 0,
            loops: HashMap::new(),
        }
    }

    pub fn with_bell_period(mut self, period: Duration) -> Self {
        self.bell_period = period;
        self
    }

    fn stop_loop(bell: BellLoop) {
        bell.stop.store(true, Ordering::SeqCst);
        if bell.join.join().is_err() {
            log::error!("alert sound thread panicked");
        }
    }
}

impl AlertEffects for TerminalAlertEffects {
    fn post_notification(&mut self, title: &str, body: &str) -> Result<(), AlertError> {
        if !self.notifications_enabled {
            return Err(AlertError::PermissionDenied);
        }
        log::warn!("NOTIFICATION [{}] {}", title, body);
        Ok(())
    }

    fn start_looping_sound(&mut self) -> Result<SoundHandle, AlertError> {
        if let Some(path) = &self.sound_path {
            std::fs::File::open(path)?;
        }

        self.next_id += 1;
        let handle = SoundHandle::new(self.next_id);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let period = self.bell_period;
        let join = std::thread::Builder::new()
            .name("alert-sound".to_string())
            .spawn(move || {
                while !stop_thread.load(Ordering::SeqCst) {
                    let _ = std::io::stderr().write_all(b"\x07");
                    let mut waited = Duration::ZERO;
                    while waited < period && !stop_thread.load(Ordering::SeqCst) {
                        std::thread::sleep(STOP_POLL);
                        waited += STOP_POLL;
                    }
                }
            })?;
        self.loops.insert(handle, BellLoop { stop, join });
        Ok(handle)
    }

    fn stop_sound(&mut self, handle: SoundHandle) {
        match self.loops.remove(&handle) {
            Some(bell) => Self::stop_loop(bell),
            None => log::debug!("stop_sound: unknown handle {}", handle.id()),
        }
    }
}

impl Drop for TerminalAlertEffects {
    fn drop(&mut self) {
        for (_, bell) in self.loops.drain() {
            Self::stop_loop(bell);
        }
    }
}
