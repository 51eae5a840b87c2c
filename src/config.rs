use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::AlertMessage;
use crate::frame::{InputSource, Rotation};
use crate::ingest::synthetic::SyntheticConfig;
use crate::ingest::PixelFormat;
use crate::monitor::{
    ConditionSettings, DEFAULT_CONDITION_LABEL, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_TRIGGER_THRESHOLD,
};
use crate::overlay::DEFAULT_STALENESS_WINDOW;
use crate::pipeline::{PipelineSettings, DEFAULT_SWEEP_INTERVAL};
use crate::scheduler::{SchedulerSettings, DEFAULT_DETECTION_INTERVAL};

const DEFAULT_SOURCE_URL: &str = "stub://driver_cam";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct KernelConfigFile {
    detection: Option<DetectionConfigFile>,
    overlay: Option<OverlayConfigFile>,
    condition: Option<ConditionConfigFile>,
    alert: Option<AlertConfigFile>,
    source: Option<SourceConfigFile>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    interval_ms: Option<u64>,
    confidence_threshold: Option<f32>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    staleness_window_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ConditionConfigFile {
    label: Option<String>,
    trigger_threshold_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    title: Option<String>,
    body: Option<String>,
    notifications: Option<bool>,
    sound_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<i32>,
    input: Option<InputSource>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct KernelSettings {
    pub detection: DetectionSettings,
    pub overlay: OverlaySettings,
    pub condition: ConditionSettings,
    pub alert: AlertSettings,
    pub source: SourceSettings,
    pub model: Option<ModelSettings>,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub interval: Duration,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub staleness_window: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub message: AlertMessage,
    pub notifications: bool,
    pub sound_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// `stub://` for the synthetic source, otherwise a directory of stills.
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub input: InputSource,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub labels_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
}

impl KernelSettings {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MICROSLEEP_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: KernelConfigFile) -> Result<Self> {
        let detection_file = file.detection.unwrap_or_default();
        let overlay_file = file.overlay.unwrap_or_default();
        let condition_file = file.condition.unwrap_or_default();
        let alert_file = file.alert.unwrap_or_default();
        let source_file = file.source.unwrap_or_default();

        let detection = DetectionSettings {
            interval: detection_file
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DETECTION_INTERVAL),
            enabled: detection_file.enabled.unwrap_or(true),
        };
        let overlay = OverlaySettings {
            staleness_window: overlay_file
                .staleness_window_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_STALENESS_WINDOW),
            sweep_interval: overlay_file
                .sweep_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        };
        let condition = ConditionSettings {
            label: condition_file
                .label
                .unwrap_or_else(|| DEFAULT_CONDITION_LABEL.to_string()),
            confidence_threshold: detection_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            trigger_threshold: condition_file
                .trigger_threshold_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TRIGGER_THRESHOLD),
        };
        let defaults = AlertMessage::default();
        let alert = AlertSettings {
            message: AlertMessage {
                title: alert_file.title.unwrap_or(defaults.title),
                body: alert_file.body.unwrap_or(defaults.body),
            },
            notifications: alert_file.notifications.unwrap_or(true),
            sound_path: alert_file.sound_path,
        };
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            rotation: Rotation::from_degrees(source_file.rotation.unwrap_or(0))?,
            input: source_file.input.unwrap_or_default(),
        };
        let model = match file.model {
            Some(ModelConfigFile {
                path: Some(path),
                labels_path,
                input_width,
                input_height,
            }) => Some(ModelSettings {
                labels_path: labels_path.unwrap_or_else(|| path.with_extension("labels")),
                path,
                input_width: input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            }),
            _ => None,
        };

        Ok(Self {
            detection,
            overlay,
            condition,
            alert,
            source,
            model,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ms) = env_millis("MICROSLEEP_DETECTION_INTERVAL_MS")? {
            self.detection.interval = ms;
        }
        if let Some(ms) = env_millis("MICROSLEEP_STALENESS_MS")? {
            self.overlay.staleness_window = ms;
        }
        if let Some(ms) = env_millis("MICROSLEEP_TRIGGER_MS")? {
            self.condition.trigger_threshold = ms;
        }
        if let Ok(label) = std::env::var("MICROSLEEP_LABEL") {
            if !label.trim().is_empty() {
                self.condition.label = label;
            }
        }
        if let Ok(path) = std::env::var("MICROSLEEP_SOUND_PATH") {
            if !path.trim().is_empty() {
                self.alert.sound_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(url) = std::env::var("MICROSLEEP_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(input) = std::env::var("MICROSLEEP_INPUT") {
            if !input.trim().is_empty() {
                self.source.input = input.parse()?;
            }
        }
        if let Ok(path) = std::env::var("MICROSLEEP_MODEL_PATH") {
            if !path.trim().is_empty() {
                let path = PathBuf::from(path);
                self.model = Some(match self.model.take() {
                    Some(model) => ModelSettings { path, ..model },
                    None => ModelSettings {
                        labels_path: path.with_extension("labels"),
                        path,
                        input_width: DEFAULT_MODEL_INPUT,
                        input_height: DEFAULT_MODEL_INPUT,
                    },
                });
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.detection.interval.is_zero() {
            return Err(anyhow!("detection interval must be greater than zero"));
        }
        if self.overlay.staleness_window.is_zero() {
            return Err(anyhow!("overlay staleness window must be greater than zero"));
        }
        if self.overlay.sweep_interval.is_zero() {
            return Err(anyhow!("overlay sweep interval must be greater than zero"));
        }
        let threshold = self.condition.confidence_threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be in [0, 1), got {}",
                threshold
            ));
        }
        let label = self.condition.label.trim();
        if label.is_empty() {
            return Err(anyhow!("condition label must not be empty"));
        }
        self.condition.label = label.to_lowercase();

        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if let Some(model) = &self.model {
            if model.input_width == 0 || model.input_height == 0 {
                return Err(anyhow!("model input dimensions must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            detection_interval: self.detection.interval,
            detection_enabled: self.detection.enabled,
            input_source: self.source.input,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            sweep_interval: self.overlay.sweep_interval,
        }
    }

    /// True when the source URL names the in-memory synthetic camera.
    pub fn uses_synthetic_source(&self) -> bool {
        self.source.url.starts_with("stub://")
    }

    pub fn synthetic_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            url: self.source.url.clone(),
            target_fps: self.source.target_fps,
            width: self.source.width,
            height: self.source.height,
            rotation: self.source.rotation,
            format: PixelFormat::Rgb24,
        }
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be an integer number of milliseconds", key))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<KernelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
