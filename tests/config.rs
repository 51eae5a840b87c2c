use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use microsleep_kernel::config::KernelSettings;
use microsleep_kernel::{InputSource, Rotation};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MICROSLEEP_CONFIG",
        "MICROSLEEP_DETECTION_INTERVAL_MS",
        "MICROSLEEP_STALENESS_MS",
        "MICROSLEEP_LABEL",
        "MICROSLEEP_TRIGGER_MS",
        "MICROSLEEP_SOUND_PATH",
        "MICROSLEEP_SOURCE_URL",
        "MICROSLEEP_INPUT",
        "MICROSLEEP_MODEL_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = KernelSettings::load().expect("load defaults");

    assert_eq!(cfg.detection.interval, Duration::from_millis(500));
    assert!(cfg.detection.enabled);
    assert_eq!(cfg.overlay.staleness_window, Duration::from_millis(1000));
    assert_eq!(cfg.overlay.sweep_interval, Duration::from_millis(250));
    assert_eq!(cfg.condition.label, "microsleep");
    assert_eq!(cfg.condition.confidence_threshold, 0.5);
    assert_eq!(cfg.condition.trigger_threshold, Duration::from_millis(5000));
    assert_eq!(cfg.alert.message.title, "Microsleep Detected");
    assert!(cfg.alert.notifications);
    assert!(cfg.alert.sound_path.is_none());
    assert_eq!(cfg.source.url, "stub://driver_cam");
    assert_eq!(cfg.source.target_fps, 10);
    assert_eq!((cfg.source.width, cfg.source.height), (640, 480));
    assert_eq!(cfg.source.input, InputSource::Rear);
    assert!(cfg.model.is_none());
    assert!(cfg.uses_synthetic_source());
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detection": { "interval_ms": 250, "confidence_threshold": 0.6, "enabled": false },
        "overlay": { "staleness_window_ms": 1500, "sweep_interval_ms": 100 },
        "condition": { "label": "Eyes_Closed", "trigger_threshold_ms": 3000 },
        "alert": { "title": "Wake up", "body": "Pull over", "notifications": false },
        "source": { "url": "stub://cabin", "target_fps": 15, "width": 320, "height": 240,
                    "rotation": 270, "input": "front" },
        "model": { "path": "/models/drowsy.onnx", "input_width": 416 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("MICROSLEEP_CONFIG", file.path());
    std::env::set_var("MICROSLEEP_TRIGGER_MS", "4000");
    std::env::set_var("MICROSLEEP_SOUND_PATH", "/tmp/alarm.wav");

    let cfg = KernelSettings::load().expect("load config");

    assert_eq!(cfg.detection.interval, Duration::from_millis(250));
    assert!(!cfg.detection.enabled);
    assert_eq!(cfg.overlay.staleness_window, Duration::from_millis(1500));
    assert_eq!(cfg.overlay.sweep_interval, Duration::from_millis(100));
    assert_eq!(cfg.condition.label, "eyes_closed");
    assert_eq!(cfg.condition.confidence_threshold, 0.6);
    assert_eq!(cfg.condition.trigger_threshold, Duration::from_millis(4000));
    assert_eq!(cfg.alert.message.title, "Wake up");
    assert_eq!(cfg.alert.message.body, "Pull over");
    assert!(!cfg.alert.notifications);
    assert_eq!(
        cfg.alert.sound_path.as_deref(),
        Some(std::path::Path::new("/tmp/alarm.wav"))
    );
    assert_eq!(cfg.source.url, "stub://cabin");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!(cfg.source.rotation, Rotation::Deg270);
    assert_eq!(cfg.source.input, InputSource::Front);

    let model = cfg.model.as_ref().expect("model settings");
    assert_eq!(model.path, std::path::Path::new("/models/drowsy.onnx"));
    assert_eq!(model.labels_path, std::path::Path::new("/models/drowsy.labels"));
    assert_eq!((model.input_width, model.input_height), (416, 640));

    let scheduler = cfg.scheduler_settings();
    assert_eq!(scheduler.detection_interval, Duration::from_millis(250));
    assert!(!scheduler.detection_enabled);
    assert_eq!(scheduler.input_source, InputSource::Front);
    let synthetic = cfg.synthetic_config();
    assert_eq!((synthetic.width, synthetic.height), (320, 240));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp toml config");
    let toml = r#"
[detection]
interval_ms = 400

[condition]
label = "microsleep"
trigger_threshold_ms = 6000

[source]
url = "/var/lib/microsleep/frames"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("MICROSLEEP_CONFIG", file.path());
    std::env::set_var("MICROSLEEP_INPUT", "front");

    let cfg = KernelSettings::load().expect("load toml config");

    assert_eq!(cfg.detection.interval, Duration::from_millis(400));
    assert_eq!(cfg.condition.trigger_threshold, Duration::from_millis(6000));
    assert_eq!(cfg.source.input, InputSource::Front);
    assert!(!cfg.uses_synthetic_source());

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("MICROSLEEP_DETECTION_INTERVAL_MS", "soon");
    let err = KernelSettings::load().unwrap_err();
    assert!(err.to_string().contains("MICROSLEEP_DETECTION_INTERVAL_MS"));
    clear_env();

    std::env::set_var("MICROSLEEP_STALENESS_MS", "0");
    let err = KernelSettings::load().unwrap_err();
    assert!(err.to_string().contains("staleness window"));
    clear_env();

    std::env::set_var("MICROSLEEP_INPUT", "sideways");
    assert!(KernelSettings::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "detection": { "confidence_threshold": 1.0 } }"#,
    )
    .expect("write config");
    std::env::set_var("MICROSLEEP_CONFIG", file.path());
    let err = KernelSettings::load().unwrap_err();
    assert!(err.to_string().contains("confidence threshold"));
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "condition": { "label": "  " } }"#)
        .expect("write config");
    std::env::set_var("MICROSLEEP_CONFIG", file.path());
    let err = KernelSettings::load().unwrap_err();
    assert!(err.to_string().contains("label"));

    clear_env();
}
