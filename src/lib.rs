//! Hotspot Sentinel
//!
//! Thermal hotspot detection for 8-bit single-channel video, driven by a
//! resilient frame loop.
//!
//! # Architecture
//!
//! - `frame`: thermal frames, per-frame results and bounded history
//! - `detect`: preprocessing, band thresholding, region extraction and
//!   rule-table classification (`ThermalDetector`)
//! - `ingest`: frame sources (synthetic scenes, Y4M files, FFmpeg)
//! - `pipeline`: the frame processor state machine with error escalation,
//!   memory guarding and progress reporting
//! - `checkpoint`: durable progress records for resume lookup
//! - `config`: runtime settings from JSON and environment
//!
//! A run never raises for per-frame trouble. Detection and read failures
//! are counted; only an uninterrupted streak at the configured ceiling or a
//! source that cannot be opened ends a run as `Failed`.

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod checkpoint;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod ui;

pub use checkpoint::{Checkpoint, CheckpointStore, FsCheckpointStore, InMemoryCheckpointStore};
pub use config::PipelineConfig;
pub use detect::{
    BoundingBox, Detection, DetectionMode, DetectionResult, DetectorBackend, FramePerformance,
    ThermalDetector, ThermalSignature, ThreatCategory,
};
pub use frame::{FrameHistory, FrameResult, ThermalFrame};
pub use ingest::{FileConfig, FileSource, SourceInfo, SyntheticConfig, SyntheticSource, VideoSource};
pub use pipeline::{
    AggregateMetrics, ChannelProgressSink, DetectionSummary, FailureReason, FrameError,
    FrameProcessor, MemoryGuard, ProcessingStatus, ProcessorOptions, ProgressEvent, ProgressSink,
    RunReport, RunState, StartError, StopHandle,
};

/// Seconds since the Unix epoch.
pub(crate) fn now_s() -> Result<f64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64())
}

pub(crate) fn now_micros() -> Result<u128> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_micros())
}
