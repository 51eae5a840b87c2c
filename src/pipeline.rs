//! Pipeline runtime.
//!
//! Runs the `FrameScheduler` on one dedicated worker thread so detection is
//! never invoked concurrently and cache updates land in processing order.
//! Frames reach the worker through a bounded channel holding at most one
//! pending frame; a frame submitted while another is pending is dropped (and
//! thereby released) instead of queuing without bound.
//!
//! A second thread sweeps the overlay cache on a fixed period, so a stale
//! overlay disappears even when no frames arrive.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::alert::AlertState;
use crate::frame::Frame;
use crate::overlay::OverlayCacheEntry;
use crate::scheduler::{DetectionControl, FrameOutcome, FrameScheduler};
use crate::Timestamp;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(250);
const WORKER_IDLE_POLL: Duration = Duration::from_millis(50);

/// Render-side collaborator, invoked on the worker after every frame.
pub trait OverlayRenderer: Send {
    fn render(&mut self, overlay: Option<&OverlayCacheEntry>, alert: AlertState);

    /// Operator-facing advisory (e.g. notification permission denied).
    fn advisory(&mut self, message: &str) {
        log::warn!("advisory: {}", message);
    }
}

/// Renderer that only logs overlay and alert changes.
#[derive(Default)]
pub struct LogRenderer {
    last_count: usize,
    last_alert: AlertState,
}

impl OverlayRenderer for LogRenderer {
    fn render(&mut self, overlay: Option<&OverlayCacheEntry>, alert: AlertState) {
        let count = overlay.map_or(0, |entry| entry.detections.len());
        if count != self.last_count {
            match overlay {
                Some(entry) => {
                    let captions: Vec<String> =
                        entry.detections.iter().map(|d| d.caption()).collect();
                    log::debug!("overlay: [{}]", captions.join(", "));
                }
                None => log::debug!("overlay: cleared"),
            }
            self.last_count = count;
        }
        if alert != self.last_alert {
            log::info!(
                "alert state: notification={} sound={}",
                alert.notification_active,
                alert.sound_active
            );
            self.last_alert = alert;
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub sweep_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub detection_ticks: u64,
    pub frames_dropped: u64,
    pub input_rejected: u64,
    pub detector_failures: u64,
    pub results_discarded: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: &FrameOutcome) {
        self.frames_processed += 1;
        if outcome.ran_detector() {
            self.detection_ticks += 1;
        }
        match outcome {
            FrameOutcome::InputRejected => self.input_rejected += 1,
            FrameOutcome::DetectorFailed => self.detector_failures += 1,
            FrameOutcome::Discarded => self.results_discarded += 1,
            FrameOutcome::Detected { .. } | FrameOutcome::Refreshed { .. } => {}
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Start the worker and sweeper threads.
    pub fn spawn(
        mut scheduler: FrameScheduler,
        renderer: Box<dyn OverlayRenderer>,
        settings: PipelineSettings,
    ) -> Result<PipelineHandle> {
        if settings.sweep_interval.is_zero() {
            return Err(anyhow!("sweep interval must be greater than zero"));
        }
        scheduler.warm_up()?;

        let control = scheduler.control();
        let (frames, rx) = mpsc::sync_channel::<Frame>(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_shutdown = shutdown.clone();
        let worker = std::thread::Builder::new()
            .name("pipeline-worker".to_string())
            .spawn(move || run_worker(scheduler, renderer, rx, worker_shutdown))?;

        let sweeper_control = control.clone();
        let sweeper_shutdown = shutdown.clone();
        let sweep_interval = settings.sweep_interval;
        let sweeper = std::thread::Builder::new()
            .name("overlay-sweeper".to_string())
            .spawn(move || run_sweeper(sweeper_control, sweep_interval, sweeper_shutdown))?;

        log::info!("pipeline started");
        Ok(PipelineHandle {
            control,
            frames,
            dropped: Arc::new(AtomicU64::new(0)),
            shutdown,
            worker: Some(worker),
            sweeper: Some(sweeper),
        })
    }
}

pub struct PipelineHandle {
    control: DetectionControl,
    frames: SyncSender<Frame>,
    dropped: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<PipelineStats>>,
    sweeper: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn control(&self) -> &DetectionControl {
        &self.control
    }

    /// Hand a frame to the worker. Returns false when it was dropped because
    /// another frame is already pending; the dropped frame is released.
    pub fn submit(&self, frame: Frame) -> bool {
        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("worker busy, dropping {:?}", frame);
                false
            }
            Err(TrySendError::Disconnected(_frame)) => {
                log::warn!("pipeline worker gone, dropping frame");
                false
            }
        }
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop both threads and return the worker's statistics.
    ///
    /// Frames still pending in the channel are released without processing.
    pub fn stop(mut self) -> Result<PipelineStats> {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut stats = match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow!("pipeline worker panicked"))?,
            None => PipelineStats::default(),
        };
        if let Some(sweeper) = self.sweeper.take() {
            sweeper
                .join()
                .map_err(|_| anyhow!("overlay sweeper panicked"))?;
        }
        stats.frames_dropped = self.frames_dropped();
        log::info!("pipeline stopped: {:?}", stats);
        Ok(stats)
    }
}

fn run_worker(
    mut scheduler: FrameScheduler,
    mut renderer: Box<dyn OverlayRenderer>,
    rx: Receiver<Frame>,
    shutdown: Arc<AtomicBool>,
) -> PipelineStats {
    let control = scheduler.control();
    let mut stats = PipelineStats::default();
    while !shutdown.load(Ordering::SeqCst) {
        let frame = match rx.recv_timeout(WORKER_IDLE_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let now = Timestamp::now();
        let outcome = scheduler.process_frame(frame, now);
        stats.record(&outcome);

        let overlay = control.overlay_snapshot(now);
        renderer.render(overlay.as_deref(), control.alert_state());
        if let Some(message) = control.take_advisory() {
            renderer.advisory(&message);
        }
    }
    stats
}

fn run_sweeper(control: DetectionControl, interval: Duration, shutdown: Arc<AtomicBool>) {
    let mut last_sweep = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(interval.min(WORKER_IDLE_POLL));
        if last_sweep.elapsed() < interval {
            continue;
        }
        last_sweep = Instant::now();
        if control.sweep_overlay(Timestamp::now()) {
            log::debug!("overlay expired");
        }
    }
}
