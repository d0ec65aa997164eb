use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use wheat_detector::config::{DemoConfig, InputLayout};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WHEAT_CONFIG",
        "WHEAT_CHECKPOINT_URL",
        "WHEAT_CHECKPOINT_PATH",
        "WHEAT_CHECKPOINT_SHA256",
        "WHEAT_BACKEND",
        "WHEAT_CONFIDENCE",
        "WHEAT_WEB_ADDR",
        "WHEAT_MODEL_TTL_SECS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DemoConfig::load().expect("load defaults");
    assert_eq!(cfg.confidence_threshold, 0.5);
    assert_eq!(cfg.model.backend, "tract");
    assert_eq!(cfg.model.input_layout, InputLayout::Chw);
    assert_eq!(cfg.model.cache_capacity, 1);
    assert_eq!(cfg.model.cache_ttl, Duration::from_secs(3600));
    assert_eq!(cfg.checkpoint.path.to_str(), Some("fasterrcnn_wheat.onnx"));
    assert!(cfg.checkpoint.url.is_none());
    assert_eq!(cfg.web.addr, "127.0.0.1:8501");
    assert_eq!(cfg.web.max_upload_bytes, 16 * 1024 * 1024);
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[checkpoint]
url = "https://models.example.org/fasterrcnn_wheat.onnx"
path = "/var/lib/wheat/model.onnx"
retries = 5

[model]
backend = "Fixed"
input_layout = "nchw"
cache_ttl_secs = 120

[detection]
confidence_threshold = 0.7

[web]
addr = "0.0.0.0:9000"
max_upload_bytes = 1048576
"#,
    );

    std::env::set_var("WHEAT_CONFIG", file.path());
    std::env::set_var("WHEAT_WEB_ADDR", "127.0.0.1:9100");
    std::env::set_var("WHEAT_MODEL_TTL_SECS", "30");

    let cfg = DemoConfig::load().expect("load config");
    clear_env();

    assert_eq!(
        cfg.checkpoint.url.as_deref(),
        Some("https://models.example.org/fasterrcnn_wheat.onnx")
    );
    assert_eq!(cfg.checkpoint.path.to_str(), Some("/var/lib/wheat/model.onnx"));
    assert_eq!(cfg.checkpoint.retries, 5);
    assert_eq!(cfg.model.backend, "fixed");
    assert_eq!(cfg.model.input_layout, InputLayout::Nchw);
    assert_eq!(cfg.model.cache_ttl, Duration::from_secs(30));
    assert_eq!(cfg.confidence_threshold, 0.7);
    assert_eq!(cfg.web.addr, "127.0.0.1:9100");
    assert_eq!(cfg.web.max_upload_bytes, 1_048_576);
}

#[test]
fn loads_json_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "model": { "backend": "fixed", "cache_capacity": 2 },
            "detection": { "confidence_threshold": 0.35 }
        }"#,
    );
    std::env::set_var("WHEAT_CONFIG", file.path());

    let cfg = DemoConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.model.backend, "fixed");
    assert_eq!(cfg.model.cache_capacity, 2);
    assert_eq!(cfg.confidence_threshold, 0.35);
}

#[test]
fn zero_confidence_falls_back_to_default() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WHEAT_CONFIDENCE", "0");
    let cfg = DemoConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.confidence_threshold, 0.5);
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    clear_env();
    std::env::set_var("WHEAT_CONFIDENCE", "high");
    assert!(DemoConfig::load().is_err());

    clear_env();
    std::env::set_var("WHEAT_CONFIDENCE", "1.5");
    assert!(DemoConfig::load().is_err());

    clear_env();
    std::env::set_var("WHEAT_BACKEND", "onnxruntime");
    assert!(DemoConfig::load().is_err());

    clear_env();
    std::env::set_var("WHEAT_CHECKPOINT_URL", "ftp://models.example.org/model.onnx");
    assert!(DemoConfig::load().is_err());

    clear_env();
    std::env::set_var("WHEAT_CHECKPOINT_SHA256", "abc123");
    assert!(DemoConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WHEAT_CONFIG", "/nonexistent/wheat.toml");
    let result = DemoConfig::load();
    clear_env();

    assert!(result.is_err());
}
