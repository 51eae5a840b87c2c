use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use microsleep_kernel::{
    AlertCoordinator, AlertEffects, AlertError, AlertMessage, BoundingBox, ConditionSettings,
    Frame, FrameOutcome, FrameScheduler, OverlayCache, PixelFormat, RawDetection, Rotation,
    SchedulerSettings, ScriptedBackend, SoundHandle, Timestamp, Transition,
    DEFAULT_STALENESS_WINDOW,
};

const WIDTH: u32 = 20;
const HEIGHT: u32 = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Calls {
    notifications: usize,
    sound_starts: usize,
    sound_stops: usize,
}

struct FakeEffects {
    calls: Arc<Mutex<Calls>>,
    next_id: u64,
}

impl AlertEffects for FakeEffects {
    fn post_notification(&mut self, _title: &str, _body: &str) -> Result<(), AlertError> {
        self.calls.lock().unwrap().notifications += 1;
        Ok(())
    }

    fn start_looping_sound(&mut self) -> Result<SoundHandle, AlertError> {
        self.next_id += 1;
        self.calls.lock().unwrap().sound_starts += 1;
        Ok(SoundHandle::new(self.next_id))
    }

    fn stop_sound(&mut self, _handle: SoundHandle) {
        self.calls.lock().unwrap().sound_stops += 1;
    }
}

/// Scheduler whose detector reports microsleep unless the simulated clock
/// falls inside one of `absent` windows.
struct Scenario {
    scheduler: FrameScheduler,
    clock: Arc<AtomicU64>,
    calls: Arc<Mutex<Calls>>,
    detector_calls: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl Scenario {
    fn new(interval_ms: u64, absent: Vec<std::ops::Range<u64>>) -> Self {
        let clock = Arc::new(AtomicU64::new(0));
        let detector_calls = Arc::new(AtomicUsize::new(0));
        let script_clock = clock.clone();
        let script_calls = detector_calls.clone();
        let backend = ScriptedBackend::from_fn(move |_| {
            script_calls.fetch_add(1, Ordering::SeqCst);
            let now = script_clock.load(Ordering::SeqCst);
            let label = if absent.iter().any(|r| r.contains(&now)) {
                "awake"
            } else {
                "microsleep"
            };
            Ok(vec![RawDetection::new(
                label,
                0.9,
                BoundingBox::new(2.0, 2.0, 8.0, 8.0),
            )])
        });

        let calls = Arc::new(Mutex::new(Calls::default()));
        let alerts = Arc::new(AlertCoordinator::new(
            Box::new(FakeEffects {
                calls: calls.clone(),
                next_id: 0,
            }),
            AlertMessage::default(),
        ));
        let scheduler = FrameScheduler::new(
            SchedulerSettings {
                detection_interval: Duration::from_millis(interval_ms),
                ..SchedulerSettings::default()
            },
            ConditionSettings::default(),
            Box::new(backend),
            Arc::new(OverlayCache::new(DEFAULT_STALENESS_WINDOW)),
            alerts,
        );
        Self {
            scheduler,
            clock,
            calls,
            detector_calls,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn frame(&mut self, ms: u64) -> FrameOutcome {
        self.clock.store(ms, Ordering::SeqCst);
        let released = self.released.clone();
        let frame = Frame::new(
            vec![0u8; (WIDTH * HEIGHT * 3) as usize],
            PixelFormat::Rgb24,
            WIDTH,
            HEIGHT,
            Rotation::Deg0,
            Timestamp::from_millis(ms),
        )
        .with_release_hook(move || {
            released.fetch_add(1, Ordering::SeqCst);
        });
        self.scheduler.process_frame(frame, Timestamp::from_millis(ms))
    }

    /// Feed frames every `step` ms over `[from, to]`, returning the times at
    /// which the monitor raised the alert.
    fn run(&mut self, from: u64, to: u64, step: u64) -> Vec<u64> {
        let mut raised = Vec::new();
        let mut t = from;
        while t <= to {
            if let FrameOutcome::Detected {
                transition: Transition::Raised,
                ..
            } = self.frame(t)
            {
                raised.push(t);
            }
            t += step;
        }
        raised
    }

    fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

#[test]
fn continuous_presence_raises_once_at_threshold() {
    let mut scenario = Scenario::new(500, Vec::new());

    assert!(scenario.run(0, 4900, 100).is_empty());
    assert!(!scenario.scheduler.control().alert_state().is_active());

    assert_eq!(scenario.run(5000, 5100, 100), vec![5000]);
    let state = scenario.scheduler.control().alert_state();
    assert!(state.notification_active);
    assert!(state.sound_active);
    assert_eq!(
        scenario.calls(),
        Calls {
            notifications: 1,
            sound_starts: 1,
            sound_stops: 0,
        }
    );
}

#[test]
fn presence_continues_without_restarting_effects() {
    let mut scenario = Scenario::new(500, Vec::new());
    assert_eq!(scenario.run(0, 12_000, 100), vec![5000]);
    assert_eq!(scenario.calls().notifications, 1);
    assert_eq!(scenario.calls().sound_starts, 1);
}

#[test]
fn single_absent_tick_restarts_timing() {
    let mut scenario = Scenario::new(100, vec![4500..4600]);

    assert!(scenario.run(0, 5100, 100).is_empty());
    let monitor = scenario.scheduler.control().monitor_state();
    assert_eq!(
        monitor.condition_started_at,
        Some(Timestamp::from_millis(4600))
    );
    assert_eq!(scenario.calls(), Calls::default());

    assert_eq!(scenario.run(5200, 9600, 100), vec![9600]);
}

#[test]
fn absence_while_alerting_stops_sound_once() {
    let mut scenario = Scenario::new(500, vec![6000..6100]);

    assert_eq!(scenario.run(0, 6500, 100), vec![5000]);
    let calls = scenario.calls();
    assert_eq!(calls.sound_starts, 1);
    assert_eq!(calls.sound_stops, 1);
    // Presence resumed at 6500; a new episode needs another full threshold.
    assert!(!scenario.scheduler.control().alert_state().is_active());
    assert_eq!(scenario.run(6600, 11_500, 100), vec![11_500]);
    assert_eq!(scenario.calls().sound_starts, 2);
}

#[test]
fn disabling_mid_alert_clears_everything() {
    let mut scenario = Scenario::new(500, Vec::new());
    assert_eq!(scenario.run(0, 5000, 100), vec![5000]);

    let control = scenario.scheduler.control();
    control.set_detection_enabled(false);
    assert!(!control.alert_state().is_active());
    assert!(control.overlay_snapshot(Timestamp::from_millis(5000)).is_none());
    assert_eq!(scenario.calls().sound_stops, 1);

    let detector_calls = scenario.detector_calls.load(Ordering::SeqCst);
    for ms in [5100, 5500, 6000] {
        match scenario.frame(ms) {
            FrameOutcome::Refreshed { overlay } => assert!(overlay.is_none()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(scenario.detector_calls.load(Ordering::SeqCst), detector_calls);

    control.set_detection_enabled(false);
    assert_eq!(scenario.calls().sound_stops, 1);
}

#[test]
fn overlay_goes_stale_without_fresh_detections() {
    let mut scenario = Scenario::new(60_000, Vec::new());
    assert!(matches!(scenario.frame(0), FrameOutcome::Detected { .. }));

    match scenario.frame(1000) {
        FrameOutcome::Refreshed { overlay } => {
            let entry = overlay.expect("overlay still fresh at window edge");
            assert_eq!(entry.detections.len(), 1);
            assert_eq!(entry.detections[0].label, "microsleep");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    match scenario.frame(1001) {
        FrameOutcome::Refreshed { overlay } => assert!(overlay.is_none()),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn every_frame_is_released_once() {
    let mut scenario = Scenario::new(500, Vec::new());
    scenario.run(0, 2000, 50);
    assert_eq!(scenario.released.load(Ordering::SeqCst), 41);
}
