use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use hotspot_sentinel::config::PipelineConfig;
use hotspot_sentinel::DetectionMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_CONFIG",
        "SENTINEL_MODE",
        "SENTINEL_CHECKPOINT_DIR",
        "SENTINEL_MEMORY_LIMIT_MB",
        "SENTINEL_MAX_CONSECUTIVE_ERRORS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg, PipelineConfig::default());
    assert_eq!(cfg.mode, DetectionMode::Balanced);
    assert_eq!(cfg.max_consecutive_errors, 5);
    assert_eq!(cfg.memory_check_interval, 50);
    assert_eq!(cfg.memory_limit_mb, 2048.0);
    assert_eq!(cfg.history_frames, 1000);
    assert_eq!(cfg.checkpoint_interval, 100);
    assert_eq!(cfg.checkpoint_keep, 5);
    assert_eq!(cfg.yield_interval, 10);
    assert_eq!(cfg.progress_queue, 64);
    assert!(cfg.simulate_thermal);
    assert!(!cfg.inject_signatures);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "mode": "accuracy",
        "errors": { "max_consecutive": 8 },
        "memory": { "limit_mb": 512, "check_interval": 25, "history_frames": 200 },
        "checkpoints": { "dir": "/var/lib/sentinel/ckpt", "interval": 40, "keep": 3 },
        "progress": { "queue_capacity": 16, "yield_interval": 5, "yield_ms": 0 },
        "ingest": { "simulate_thermal": false, "inject_signatures": true }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_MODE", "speed");
    std::env::set_var("SENTINEL_MEMORY_LIMIT_MB", "1024");

    let cfg = PipelineConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.mode, DetectionMode::Speed);
    assert_eq!(cfg.max_consecutive_errors, 8);
    assert_eq!(cfg.memory_limit_mb, 1024.0);
    assert_eq!(cfg.memory_check_interval, 25);
    assert_eq!(cfg.history_frames, 200);
    assert_eq!(cfg.checkpoint_dir, PathBuf::from("/var/lib/sentinel/ckpt"));
    assert_eq!(cfg.checkpoint_interval, 40);
    assert_eq!(cfg.checkpoint_keep, 3);
    assert_eq!(cfg.progress_queue, 16);
    assert_eq!(cfg.yield_interval, 5);
    assert_eq!(cfg.yield_ms, 0);
    assert!(!cfg.simulate_thermal);
    assert!(cfg.inject_signatures);
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_MAX_CONSECUTIVE_ERRORS", "many");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_MAX_CONSECUTIVE_ERRORS", "0");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_MODE", "turbo");
    assert!(PipelineConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_or_malformed_file_fails() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_CONFIG", "/nonexistent/sentinel.json");
    assert!(PipelineConfig::load().is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ \"mode\": ").expect("write config");
    std::env::set_var("SENTINEL_CONFIG", file.path());
    assert!(PipelineConfig::load().is_err());
    clear_env();
}
