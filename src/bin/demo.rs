//! demo - deterministic simulated-time run of the microsleep pipeline
//!
//! Drives the frame scheduler synchronously with a synthetic camera and a
//! scripted detector that reports microsleep on every tick except during an
//! optional gap. Prints each monitor transition, then the final alert state
//! and how many times each alert effect was invoked.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use microsleep_kernel::ingest::synthetic::SyntheticConfig;
use microsleep_kernel::{
    AlertCoordinator, AlertEffects, AlertError, AlertMessage, BoundingBox, ConditionSettings,
    FrameOutcome, FrameScheduler, OverlayCache, RawDetection, SchedulerSettings, ScriptedBackend,
    SoundHandle, SyntheticSource, Timestamp, Transition, DEFAULT_STALENESS_WINDOW,
};

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 8)]
    seconds: u64,
    /// Frames per second fed to the scheduler.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Start of a window (ms) in which the detector sees an alert face.
    #[arg(long)]
    gap_at_ms: Option<u64>,
    /// Length of that window in milliseconds.
    #[arg(long, default_value_t = 100)]
    gap_ms: u64,
    /// Disable detection at this simulated time (ms).
    #[arg(long)]
    disable_at_ms: Option<u64>,
    /// Designated class reported by the scripted detector.
    #[arg(long, default_value = "microsleep")]
    label: String,
}

#[derive(Clone, Debug, Default)]
struct EffectCounts {
    notifications: u64,
    sound_starts: u64,
    sound_stops: u64,
}

/// Alert effects that only count invocations.
struct CountingEffects {
    counts: Arc<Mutex<EffectCounts>>,
    next_id: u64,
}

impl CountingEffects {
    fn bump(&self, f: impl FnOnce(&mut EffectCounts)) {
        if let Ok(mut counts) = self.counts.lock() {
            f(&mut counts);
        }
    }
}

impl AlertEffects for CountingEffects {
    fn post_notification(&mut self, title: &str, body: &str) -> Result<(), AlertError> {
        println!("    notification: {} - {}", title, body);
        self.bump(|c| c.notifications += 1);
        Ok(())
    }

    fn start_looping_sound(&mut self) -> Result<SoundHandle, AlertError> {
        self.next_id += 1;
        println!("    sound: start #{}", self.next_id);
        self.bump(|c| c.sound_starts += 1);
        Ok(SoundHandle::new(self.next_id))
    }

    fn stop_sound(&mut self, handle: SoundHandle) {
        println!("    sound: stop #{}", handle.id());
        self.bump(|c| c.sound_stops += 1);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("--fps must be greater than zero"));
    }

    // Scripted detector keyed off the simulated clock rather than call count.
    let clock = Arc::new(AtomicU64::new(0));
    let script_clock = clock.clone();
    let gap = args.gap_at_ms.map(|start| start..start.saturating_add(args.gap_ms));
    let label = args.label.clone();
    let face = BoundingBox::new(
        FRAME_WIDTH as f32 * 0.3,
        FRAME_HEIGHT as f32 * 0.2,
        FRAME_WIDTH as f32 * 0.7,
        FRAME_HEIGHT as f32 * 0.8,
    );
    let backend = ScriptedBackend::from_fn(move |_call| {
        let now = script_clock.load(Ordering::SeqCst);
        let in_gap = gap.as_ref().is_some_and(|gap| gap.contains(&now));
        let detection = if in_gap {
            RawDetection::new("awake", 0.88, face)
        } else {
            RawDetection::new(label.clone(), 0.91, face)
        };
        Ok(vec![detection])
    });

    let counts = Arc::new(Mutex::new(EffectCounts::default()));
    let effects = CountingEffects {
        counts: counts.clone(),
        next_id: 0,
    };
    let alerts = Arc::new(AlertCoordinator::new(
        Box::new(effects),
        AlertMessage::default(),
    ));
    let cache = Arc::new(OverlayCache::new(DEFAULT_STALENESS_WINDOW));
    let condition = ConditionSettings {
        label: args.label.to_lowercase(),
        ..ConditionSettings::default()
    };
    let mut scheduler = FrameScheduler::new(
        SchedulerSettings::default(),
        condition,
        Box::new(backend),
        cache,
        alerts,
    );
    let control = scheduler.control();

    let mut source = SyntheticSource::new(SyntheticConfig {
        target_fps: args.fps,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        ..SyntheticConfig::default()
    })?;
    source.connect()?;

    let step_ms = (1000 / u64::from(args.fps)).max(1);
    let end_ms = args.seconds.saturating_mul(1000);
    println!(
        "demo: {} s at {} fps, label={}, gap={:?}, disable_at={:?}",
        args.seconds, args.fps, args.label, args.gap_at_ms, args.disable_at_ms
    );

    let mut last_transition = None;
    let mut t = 0;
    while t <= end_ms {
        if control.is_detection_enabled() && args.disable_at_ms.is_some_and(|d| t >= d) {
            println!("{:>6} ms  detection disabled", t);
            control.set_detection_enabled(false);
        }
        clock.store(t, Ordering::SeqCst);
        let now = Timestamp::from_millis(t);
        let frame = source.next_frame_at(now)?;
        match scheduler.process_frame(frame, now) {
            FrameOutcome::Detected { transition, .. } => {
                let changed = last_transition != Some(transition);
                if changed || transition == Transition::Raised {
                    println!("{:>6} ms  {:?}", t, transition);
                }
                last_transition = Some(transition);
            }
            FrameOutcome::DetectorFailed => println!("{:>6} ms  detector failed", t),
            FrameOutcome::InputRejected => println!("{:>6} ms  frame rejected", t),
            FrameOutcome::Discarded | FrameOutcome::Refreshed { .. } => {}
        }
        t += step_ms;
    }

    let state = control.alert_state();
    let counts = counts
        .lock()
        .map_err(|_| anyhow!("effect counters poisoned"))?
        .clone();
    let stats = source.stats();
    println!(
        "final alert: notification_active={} sound_active={}",
        state.notification_active, state.sound_active
    );
    println!(
        "effects: notifications={} sound_starts={} sound_stops={}",
        counts.notifications, counts.sound_starts, counts.sound_stops
    );
    println!(
        "frames: captured={} released={}",
        stats.frames_captured, stats.frames_released
    );
    Ok(())
}
