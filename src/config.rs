use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::checkpoint::{DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CHECKPOINT_KEEP};
use crate::detect::DetectionMode;
use crate::frame::DEFAULT_HISTORY_FRAMES;
use crate::pipeline::errors::DEFAULT_MAX_CONSECUTIVE_ERRORS;
use crate::pipeline::memory::{DEFAULT_MEMORY_CHECK_INTERVAL, DEFAULT_MEMORY_LIMIT_MB};
use crate::pipeline::processor::DEFAULT_YIELD_INTERVAL;
use crate::pipeline::progress::DEFAULT_PROGRESS_QUEUE;

const DEFAULT_CHECKPOINT_DIR: &str = "checkpoints";
const DEFAULT_YIELD_MS: u64 = 1;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    mode: Option<DetectionMode>,
    errors: Option<ErrorsConfigFile>,
    memory: Option<MemoryConfigFile>,
    checkpoints: Option<CheckpointConfigFile>,
    progress: Option<ProgressConfigFile>,
    ingest: Option<IngestConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ErrorsConfigFile {
    max_consecutive: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MemoryConfigFile {
    limit_mb: Option<f64>,
    check_interval: Option<u64>,
    history_frames: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CheckpointConfigFile {
    dir: Option<PathBuf>,
    interval: Option<u64>,
    keep: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ProgressConfigFile {
    queue_capacity: Option<usize>,
    yield_interval: Option<u64>,
    yield_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct IngestConfigFile {
    simulate_thermal: Option<bool>,
    inject_signatures: Option<bool>,
}

/// Runtime settings for the detector and frame loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mode: DetectionMode,
    pub max_consecutive_errors: u32,
    pub memory_limit_mb: f64,
    pub memory_check_interval: u64,
    pub history_frames: usize,
    pub checkpoint_dir: PathBuf,
    pub checkpoint_interval: u64,
    pub checkpoint_keep: usize,
    pub progress_queue: usize,
    pub yield_interval: u64,
    pub yield_ms: u64,
    pub simulate_thermal: bool,
    pub inject_signatures: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::default(),
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            memory_check_interval: DEFAULT_MEMORY_CHECK_INTERVAL,
            history_frames: DEFAULT_HISTORY_FRAMES,
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            checkpoint_keep: DEFAULT_CHECKPOINT_KEEP,
            progress_queue: DEFAULT_PROGRESS_QUEUE,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            yield_ms: DEFAULT_YIELD_MS,
            simulate_thermal: true,
            inject_signatures: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the JSON file named by `SENTINEL_CONFIG`, then
    /// `SENTINEL_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let errors = file.errors.unwrap_or_default();
        let memory = file.memory.unwrap_or_default();
        let checkpoints = file.checkpoints.unwrap_or_default();
        let progress = file.progress.unwrap_or_default();
        let ingest = file.ingest.unwrap_or_default();
        Self {
            mode: file.mode.unwrap_or(defaults.mode),
            max_consecutive_errors: errors
                .max_consecutive
                .unwrap_or(defaults.max_consecutive_errors),
            memory_limit_mb: memory.limit_mb.unwrap_or(defaults.memory_limit_mb),
            memory_check_interval: memory
                .check_interval
                .unwrap_or(defaults.memory_check_interval),
            history_frames: memory.history_frames.unwrap_or(defaults.history_frames),
            checkpoint_dir: checkpoints.dir.unwrap_or(defaults.checkpoint_dir),
            checkpoint_interval: checkpoints
                .interval
                .unwrap_or(defaults.checkpoint_interval),
            checkpoint_keep: checkpoints.keep.unwrap_or(defaults.checkpoint_keep),
            progress_queue: progress.queue_capacity.unwrap_or(defaults.progress_queue),
            yield_interval: progress.yield_interval.unwrap_or(defaults.yield_interval),
            yield_ms: progress.yield_ms.unwrap_or(defaults.yield_ms),
            simulate_thermal: ingest.simulate_thermal.unwrap_or(defaults.simulate_thermal),
            inject_signatures: ingest
                .inject_signatures
                .unwrap_or(defaults.inject_signatures),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("SENTINEL_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode.trim().parse()?;
            }
        }
        if let Ok(dir) = std::env::var("SENTINEL_CHECKPOINT_DIR") {
            if !dir.trim().is_empty() {
                self.checkpoint_dir = PathBuf::from(dir);
            }
        }
        if let Ok(limit) = std::env::var("SENTINEL_MEMORY_LIMIT_MB") {
            self.memory_limit_mb = limit
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_MEMORY_LIMIT_MB must be a number of megabytes"))?;
        }
        if let Ok(max) = std::env::var("SENTINEL_MAX_CONSECUTIVE_ERRORS") {
            self.max_consecutive_errors = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_MAX_CONSECUTIVE_ERRORS must be an integer"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_errors == 0 {
            return Err(anyhow!("max consecutive errors must be greater than zero"));
        }
        if !(self.memory_limit_mb > 0.0) {
            return Err(anyhow!("memory limit must be greater than zero"));
        }
        if self.memory_check_interval == 0 {
            return Err(anyhow!("memory check interval must be greater than zero"));
        }
        if self.history_frames == 0 {
            return Err(anyhow!("history must retain at least one frame"));
        }
        if self.checkpoint_interval == 0 {
            return Err(anyhow!("checkpoint interval must be greater than zero"));
        }
        if self.checkpoint_keep == 0 {
            return Err(anyhow!("at least one checkpoint must be kept"));
        }
        if self.progress_queue == 0 {
            return Err(anyhow!("progress queue capacity must be greater than zero"));
        }
        if self.yield_interval == 0 {
            return Err(anyhow!("yield interval must be greater than zero"));
        }
        if self.checkpoint_dir.as_os_str().is_empty() {
            return Err(anyhow!("checkpoint dir must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let file: PipelineConfigFile =
            serde_json::from_str(r#"{"mode":"speed","checkpoints":{"keep":2}}"#).unwrap();
        let cfg = PipelineConfig::from_file(file);
        assert_eq!(cfg.mode, DetectionMode::Speed);
        assert_eq!(cfg.checkpoint_keep, 2);
        assert_eq!(cfg.checkpoint_interval, 100);
        assert_eq!(cfg.max_consecutive_errors, 5);
        assert_eq!(cfg.checkpoint_dir, PathBuf::from("checkpoints"));
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let cfg = PipelineConfig {
            memory_check_interval: 0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = PipelineConfig {
            max_consecutive_errors: 0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_mode_in_file_fails() {
        assert!(serde_json::from_str::<PipelineConfigFile>(r#"{"mode":"turbo"}"#).is_err());
    }
}
