//! microsleepd - driver microsleep detection daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source (synthetic camera or a
//!    directory of recorded stills)
//! 2. Hands each frame to the pipeline worker, dropping frames while the
//!    worker is busy
//! 3. Runs detection at the configured interval and keeps the overlay fresh
//! 4. Raises a notification and looping alarm once microsleep is sustained
//! 5. Stops cleanly on Ctrl-C

use anyhow::Result;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use microsleep_kernel::config::KernelSettings;
use microsleep_kernel::ingest::frame_interval;
use microsleep_kernel::pipeline::LogRenderer;
use microsleep_kernel::{
    AlertCoordinator, DetectorBackend, Frame, FrameScheduler, OverlayCache, Pipeline,
    ScriptedBackend, SyntheticSource, TerminalAlertEffects, Timestamp,
};

const HEALTH_LOG_PERIOD: Duration = Duration::from_secs(5);

/// Frame sources the daemon can drive.
enum Source {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-image")]
    Images(microsleep_kernel::ImageDirSource),
}

impl Source {
    fn open(settings: &KernelSettings) -> Result<Self> {
        if settings.uses_synthetic_source() {
            let mut source = SyntheticSource::new(settings.synthetic_config())?;
            source.connect()?;
            return Ok(Source::Synthetic(source));
        }
        open_image_dir(settings)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            Source::Synthetic(source) => source.next_frame().map(Some),
            #[cfg(feature = "ingest-image")]
            Source::Images(source) => source.next_frame(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Source::Synthetic(source) => {
                let stats = source.stats();
                format!(
                    "health={} frames={} released={} url={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.frames_released,
                    stats.url
                )
            }
            #[cfg(feature = "ingest-image")]
            Source::Images(source) => format!("frames={}", source.frames_captured()),
        }
    }
}

#[cfg(feature = "ingest-image")]
fn open_image_dir(settings: &KernelSettings) -> Result<Source> {
    use microsleep_kernel::ImageDirConfig;

    let path = settings
        .source
        .url
        .strip_prefix("file://")
        .unwrap_or(&settings.source.url);
    let mut source = microsleep_kernel::ImageDirSource::new(ImageDirConfig {
        path: path.into(),
        target_fps: settings.source.target_fps,
        loop_playback: true,
        rotation: settings.source.rotation,
    })?;
    source.connect()?;
    Ok(Source::Images(source))
}

#[cfg(not(feature = "ingest-image"))]
fn open_image_dir(settings: &KernelSettings) -> Result<Source> {
    Err(anyhow::anyhow!(
        "source url {} requires the ingest-image feature",
        settings.source.url
    ))
}

#[cfg(feature = "backend-tract")]
fn model_backend(settings: &KernelSettings) -> Result<Option<Box<dyn DetectorBackend>>> {
    let Some(model) = &settings.model else {
        return Ok(None);
    };
    let backend = microsleep_kernel::TractBackend::new(
        &model.path,
        &model.labels_path,
        model.input_width,
        model.input_height,
    )?;
    log::info!("detector: tract model {}", model.path.display());
    Ok(Some(Box::new(backend)))
}

#[cfg(not(feature = "backend-tract"))]
fn model_backend(settings: &KernelSettings) -> Result<Option<Box<dyn DetectorBackend>>> {
    if let Some(model) = &settings.model {
        log::warn!(
            "model {} configured but backend-tract is disabled; using scripted detector",
            model.path.display()
        );
    }
    Ok(None)
}

fn build_backend(settings: &KernelSettings) -> Result<Box<dyn DetectorBackend>> {
    if let Some(backend) = model_backend(settings)? {
        return Ok(backend);
    }
    log::info!("detector: scripted awake/{} cycle", settings.condition.label);
    Ok(Box::new(ScriptedBackend::drowsy_cycle(
        &settings.condition.label,
        6,
        14,
        settings.source.width,
        settings.source.height,
    )))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = KernelSettings::load()?;
    log::info!(
        "microsleepd {} starting: label={} trigger={}ms interval={}ms",
        env!("CARGO_PKG_VERSION"),
        settings.condition.label,
        settings.condition.trigger_threshold.as_millis(),
        settings.detection.interval.as_millis()
    );

    let mut source = Source::open(&settings)?;
    let backend = build_backend(&settings)?;

    let effects = TerminalAlertEffects::new(
        settings.alert.notifications,
        settings.alert.sound_path.clone(),
    );
    let alerts = Arc::new(AlertCoordinator::new(
        Box::new(effects),
        settings.alert.message.clone(),
    ));
    let cache = Arc::new(OverlayCache::new(settings.overlay.staleness_window));
    let scheduler = FrameScheduler::new(
        settings.scheduler_settings(),
        settings.condition.clone(),
        backend,
        cache,
        alerts,
    );
    let pipeline = Pipeline::spawn(
        scheduler,
        Box::new(LogRenderer::default()),
        settings.pipeline_settings(),
    )?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let pace = frame_interval(settings.source.target_fps);
    let mut last_health_log = Instant::now();
    log::info!("microsleepd running at {} fps (Ctrl-C to stop)", settings.source.target_fps);

    while rx.try_recv().is_err() {
        let started = Instant::now();
        match source.next_frame() {
            Ok(Some(frame)) => {
                pipeline.submit(frame);
            }
            Ok(None) => {
                log::info!("source exhausted");
                break;
            }
            Err(e) => log::warn!("frame capture failed: {}", e),
        }

        if last_health_log.elapsed() >= HEALTH_LOG_PERIOD {
            let control = pipeline.control();
            let alert = control.alert_state();
            log::info!(
                "health: source {} overlay={} detection={} input={:?} alert={} dropped={}",
                source.describe(),
                control.overlay_snapshot(Timestamp::now()).is_some(),
                control.is_detection_enabled(),
                control.input_source(),
                alert.is_active(),
                pipeline.frames_dropped()
            );
            last_health_log = Instant::now();
        }

        if let Some(remaining) = pace.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    log::info!("shutdown requested, stopping pipeline...");
    let stats = pipeline.stop()?;
    log::info!(
        "processed={} detections={} dropped={} rejected={} detector_failures={}",
        stats.frames_processed,
        stats.detection_ticks,
        stats.frames_dropped,
        stats.input_rejected,
        stats.detector_failures
    );
    Ok(())
}
