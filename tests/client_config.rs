use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use wavetrack::config::ClientConfig;
use wavetrack::{DetectionOption, OutputOptions};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WAVETRACK_CONFIG",
        "WAVETRACK_ENDPOINT",
        "WAVETRACK_OPTIONS",
        "WAVETRACK_OUTPUT",
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
fn defaults_without_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.endpoint, "http://127.0.0.1:8000");
    assert!(cfg.default_options.is_empty());
    assert_eq!(cfg.image_path, PathBuf::from("detections.jpg"));
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "endpoint": "https://sar.example.com/api",
            "options": ["count", "image"],
            "output": { "image_path": "runs/latest.jpg" }
        }"#,
    );
    std::env::set_var("WAVETRACK_CONFIG", file.path());
    std::env::set_var("WAVETRACK_OPTIONS", "probabilities");

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.endpoint, "https://sar.example.com/api");
    assert_eq!(
        cfg.default_options,
        OutputOptions::from_selection([DetectionOption::DetectionProbability])
    );
    assert_eq!(cfg.image_path, PathBuf::from("runs/latest.jpg"));

    std::env::set_var("WAVETRACK_ENDPOINT", "http://10.1.2.3:9000");
    std::env::set_var("WAVETRACK_OUTPUT", "/tmp/ships.jpg");
    std::env::remove_var("WAVETRACK_OPTIONS");
    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.endpoint, "http://10.1.2.3:9000");
    assert_eq!(
        cfg.default_options.selected(),
        vec![DetectionOption::ShipCount, DetectionOption::ProcessedImage]
    );
    assert_eq!(cfg.image_path, PathBuf::from("/tmp/ships.jpg"));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
endpoint = "http://inference.local:8000/"
options = ["count", "probabilities", "image"]

[output]
image_path = "annotated.jpg"
"#,
    );
    std::env::set_var("WAVETRACK_CONFIG", file.path());

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.endpoint, "http://inference.local:8000/");
    assert_eq!(cfg.default_options, OutputOptions::all());
    assert_eq!(cfg.image_path, PathBuf::from("annotated.jpg"));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WAVETRACK_ENDPOINT", "ftp://files.example.com");
    let err = ClientConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid endpoint"));
    std::env::remove_var("WAVETRACK_ENDPOINT");

    std::env::set_var("WAVETRACK_OPTIONS", "count,heatmap");
    let err = ClientConfig::load().unwrap_err();
    assert!(err.to_string().contains("WAVETRACK_OPTIONS"));
    std::env::remove_var("WAVETRACK_OPTIONS");

    let file = write_config(".json", r#"{ "endpoint": "http://x", "retries": 3 }"#);
    std::env::set_var("WAVETRACK_CONFIG", file.path());
    let err = ClientConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
