use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::checkpoint::{Checkpoint, CheckpointStore, FsCheckpointStore, DEFAULT_CHECKPOINT_INTERVAL};
use crate::config::PipelineConfig;
use crate::detect::{DetectionResult, DetectorBackend};
use crate::frame::{FrameHistory, FrameResult, DEFAULT_HISTORY_FRAMES};
use crate::ingest::{SourceInfo, VideoSource};
use crate::now_s;

use super::errors::{ErrorPolicy, Escalation, FailureReason, FrameError, StartError, DEFAULT_MAX_CONSECUTIVE_ERRORS};
use super::memory::{MemoryGuard, ProcessMemorySampler};
use super::metrics::{AggregateMetrics, DetectionSummary, DetectionTally};
use super::progress::{NullProgressSink, ProgressEvent, ProgressSink};
use super::state::{progress_percent, ProcessingStatus, RunState};

pub const DEFAULT_YIELD_INTERVAL: u64 = 10;
pub const DEFAULT_YIELD_DURATION: Duration = Duration::from_millis(1);

/// Loop tuning. Memory limits live on the [`MemoryGuard`].
#[derive(Clone, Debug)]
pub struct ProcessorOptions {
    pub max_consecutive_errors: u32,
    pub history_frames: usize,
    /// Frames between checkpoints; 0 disables checkpointing.
    pub checkpoint_interval: u64,
    /// Frames between cooperative yields; 0 disables yielding.
    pub yield_interval: u64,
    pub yield_duration: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            history_frames: DEFAULT_HISTORY_FRAMES,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            yield_duration: DEFAULT_YIELD_DURATION,
        }
    }
}

impl From<&PipelineConfig> for ProcessorOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            max_consecutive_errors: cfg.max_consecutive_errors,
            history_frames: cfg.history_frames,
            checkpoint_interval: cfg.checkpoint_interval,
            yield_interval: cfg.yield_interval,
            yield_duration: Duration::from_millis(cfg.yield_ms),
        }
    }
}

/// Final outcome of one run. Returned for failed runs too.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub source_id: String,
    /// `Completed` or `Failed`.
    pub status: RunState,
    /// The run ended early on an external stop request.
    pub stopped: bool,
    pub frames_processed: u64,
    pub error_count: u64,
    pub metrics: AggregateMetrics,
    pub detections_summary: DetectionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunState::Completed
    }
}

#[derive(Default)]
struct RunSnapshot {
    state: RunState,
    source_id: Option<String>,
    current_frame: u64,
    total_frames: u64,
    detections: u64,
    consecutive_errors: u32,
    memory_mb: Option<f64>,
    metrics: AggregateMetrics,
    history: FrameHistory,
}

struct Shared {
    stop: AtomicBool,
    run: Mutex<RunSnapshot>,
}

impl Shared {
    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let mut run = lock(&self.run);
        if run.state == RunState::Running {
            run.state = RunState::StopRequested;
            log::info!("stop requested");
        }
    }
}

/// Cloneable handle that asks the current run to stop.
///
/// The flag is checked at the top of each frame iteration, so the frame in
/// flight always settles first.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.request_stop();
    }
}

#[derive(Default)]
struct LoopOutcome {
    tally: DetectionTally,
    frames_processed: u64,
    error_count: u64,
    stopped: bool,
    failure: Option<FailureReason>,
}

/// Drives a [`VideoSource`] through a detector with bounded memory,
/// periodic checkpoints and consecutive-failure escalation.
///
/// At most one run is active at a time. Status, history and stop requests
/// are safe to use from other threads while a run is in progress.
pub struct FrameProcessor {
    detector: Mutex<Box<dyn DetectorBackend>>,
    options: ProcessorOptions,
    shared: Arc<Shared>,
    progress: Arc<dyn ProgressSink>,
    checkpoints: Mutex<Option<Box<dyn CheckpointStore + Send>>>,
    memory: Mutex<MemoryGuard>,
}

impl FrameProcessor {
    pub fn new<D: DetectorBackend + 'static>(detector: D, options: ProcessorOptions) -> Self {
        let run = RunSnapshot {
            history: FrameHistory::new(options.history_frames),
            ..RunSnapshot::default()
        };
        Self {
            detector: Mutex::new(Box::new(detector)),
            options,
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                run: Mutex::new(run),
            }),
            progress: Arc::new(NullProgressSink),
            checkpoints: Mutex::new(None),
            memory: Mutex::new(MemoryGuard::default()),
        }
    }

    /// Processor wired from config: filesystem checkpoints and a process
    /// memory guard.
    pub fn from_config<D: DetectorBackend + 'static>(detector: D, cfg: &PipelineConfig) -> Self {
        let guard = MemoryGuard::new(
            Box::new(ProcessMemorySampler::new()),
            cfg.memory_limit_mb,
            cfg.history_frames,
            cfg.memory_check_interval,
        );
        Self::new(detector, ProcessorOptions::from(cfg))
            .with_memory_guard(guard)
            .with_checkpoint_store(FsCheckpointStore::new(&cfg.checkpoint_dir, cfg.checkpoint_keep))
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_checkpoint_store<S: CheckpointStore + Send + 'static>(self, store: S) -> Self {
        *lock(&self.checkpoints) = Some(Box::new(store));
        self
    }

    pub fn with_memory_guard(self, guard: MemoryGuard) -> Self {
        *lock(&self.memory) = guard;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_processing(&self) -> bool {
        lock(&self.shared.run).state.is_active()
    }

    pub fn status(&self) -> ProcessingStatus {
        let run = lock(&self.shared.run);
        ProcessingStatus {
            state: run.state,
            is_processing: run.state.is_active(),
            source_id: run.source_id.clone(),
            current_frame: run.current_frame,
            total_frames: run.total_frames,
            progress_percent: progress_percent(run.current_frame, run.total_frames),
            frames_retained: run.history.len(),
            detections_so_far: run.detections,
            consecutive_errors: run.consecutive_errors,
            memory_mb: run.memory_mb,
            metrics: run.metrics.clone(),
        }
    }

    /// Retained result for `frame_number`, if it has not been evicted.
    pub fn frame_result(&self, frame_number: u64) -> Option<FrameResult> {
        lock(&self.shared.run).history.get(frame_number).cloned()
    }

    /// Retained results in frame order.
    pub fn history(&self) -> Vec<FrameResult> {
        lock(&self.shared.run).history.to_vec()
    }

    /// Latest checkpoint for `source_id`. Informational only: runs always
    /// start from the first frame.
    pub fn resume_hint(&self, source_id: &str) -> Result<Option<Checkpoint>> {
        match lock(&self.checkpoints).as_ref() {
            Some(store) => store.find_resumable(source_id),
            None => Ok(None),
        }
    }

    /// Runs `source` to completion, failure or stop.
    ///
    /// Rejects with [`StartError::AlreadyRunning`] while another run is
    /// active. Fatal outcomes are reported in the returned [`RunReport`].
    pub fn process(&self, source: &mut dyn VideoSource) -> Result<RunReport, StartError> {
        let source_id = source.source_id().to_string();
        self.begin(&source_id)?;
        let _settle = SettleOnUnwind(&self.shared);
        log::info!("processing {}", source_id);
        let started = Instant::now();

        let info = match source.open() {
            Ok(info) => info,
            Err(err) => {
                let failure = FailureReason::SourceOpen {
                    message: format!("{:#}", err),
                };
                log::error!("{}: {}", source_id, failure);
                let outcome = LoopOutcome {
                    failure: Some(failure),
                    ..LoopOutcome::default()
                };
                return Ok(self.finish(source_id, outcome, started, 0.0));
            }
        };
        log::info!(
            "{}: {} frames declared at {:.2} fps ({}x{})",
            source_id,
            info.total_frames,
            info.fps,
            info.width,
            info.height
        );
        lock(&self.shared.run).total_frames = info.total_frames;

        let outcome = self.run_frames(source, &source_id, &info, started);
        source.close();
        Ok(self.finish(source_id, outcome, started, info.fps))
    }

    fn begin(&self, source_id: &str) -> Result<(), StartError> {
        let mut run = lock(&self.shared.run);
        if run.state.is_active() {
            log::warn!(
                "rejecting {}: {} is still running",
                source_id,
                run.source_id.as_deref().unwrap_or("unknown")
            );
            return Err(StartError::AlreadyRunning);
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        run.state = RunState::Running;
        run.source_id = Some(source_id.to_string());
        run.current_frame = 0;
        run.total_frames = 0;
        run.detections = 0;
        run.consecutive_errors = 0;
        run.metrics = AggregateMetrics::default();
        run.history.clear();
        Ok(())
    }

    fn run_frames(
        &self,
        source: &mut dyn VideoSource,
        source_id: &str,
        info: &SourceInfo,
        started: Instant,
    ) -> LoopOutcome {
        let mut detector = lock(&self.detector);
        if let Err(err) = detector.warm_up() {
            log::warn!("{} warm-up failed: {:#}", detector.name(), err);
        }
        let mut policy = ErrorPolicy::new(self.options.max_consecutive_errors);
        let mut outcome = LoopOutcome::default();
        let mut iteration: u64 = 0;

        loop {
            if self.shared.stop.load(Ordering::SeqCst) {
                outcome.stopped = true;
                log::info!("{}: stopping after {} frames", source_id, iteration);
                break;
            }

            let frame_number = iteration;
            let mut current_fps = 0.0;
            let (record, escalation) = match contain_panic("frame source", || source.next_frame()) {
                Ok(None) => break,
                Ok(Some(frame)) => {
                    let (result, escalation) = match contain_panic("detector", || detector.detect(&frame)) {
                        Ok(result) => {
                            policy.record_success();
                            (result, Escalation::Continue)
                        }
                        Err(err) => {
                            let escalation = policy.record_failure(FrameError::Detection {
                                frame: frame_number,
                                reason: format!("{:#}", err),
                            });
                            (DetectionResult::default(), escalation)
                        }
                    };
                    outcome.tally.record(&result.detections);
                    outcome.frames_processed += 1;
                    current_fps = result.performance.fps;
                    let record = FrameResult {
                        frame_number,
                        timestamp: frame_timestamp(frame_number, info.fps),
                        detections: result.detections,
                        performance: result.performance,
                        consecutive_errors: policy.consecutive(),
                    };
                    (Some(record), escalation)
                }
                Err(err) => {
                    let escalation = policy.record_failure(FrameError::Iteration {
                        frame: frame_number,
                        reason: format!("{:#}", err),
                    });
                    (None, escalation)
                }
            };
            iteration += 1;

            let event = {
                let mut run = lock(&self.shared.run);
                run.current_frame = iteration;
                run.detections = outcome.tally.total();
                run.consecutive_errors = policy.consecutive();
                if let Some(record) = record {
                    run.history.push(record);
                }
                ProgressEvent {
                    progress_percent: progress_percent(iteration, run.total_frames),
                    current_frame: iteration,
                    total_frames: run.total_frames,
                    detections_so_far: run.detections,
                    current_fps,
                    memory_mb: run.memory_mb,
                    error_count: policy.consecutive(),
                }
            };
            self.progress.on_event(event);

            if escalation == Escalation::Abort {
                let failure = policy.failure_reason();
                log::error!("{}: {}", source_id, failure);
                outcome.failure = Some(failure);
                break;
            }

            self.guard_memory(iteration);
            if self.options.checkpoint_interval > 0
                && iteration % self.options.checkpoint_interval == 0
            {
                self.save_checkpoint(source_id, iteration, info, &outcome, started);
            }
            if self.options.yield_interval > 0 && iteration % self.options.yield_interval == 0 {
                if self.options.yield_duration.is_zero() {
                    thread::yield_now();
                } else {
                    thread::sleep(self.options.yield_duration);
                }
            }
        }

        outcome.error_count = policy.total_failures();
        outcome
    }

    fn guard_memory(&self, iteration: u64) {
        let mut guard = lock(&self.memory);
        if !guard.is_due(iteration) {
            return;
        }
        let mut run = lock(&self.shared.run);
        let check = guard.check(&mut run.history);
        if check.resident_mb.is_some() {
            run.memory_mb = check.resident_mb;
        }
    }

    fn save_checkpoint(
        &self,
        source_id: &str,
        iteration: u64,
        info: &SourceInfo,
        outcome: &LoopOutcome,
        started: Instant,
    ) {
        let mut store = lock(&self.checkpoints);
        let Some(store) = store.as_mut() else {
            return;
        };
        let checkpoint = Checkpoint {
            video_path: source_id.to_string(),
            frame_number: iteration,
            total_frames: info.total_frames,
            detections_count: outcome.tally.total(),
            timestamp: now_s().unwrap_or_default(),
            performance_metrics: outcome
                .tally
                .metrics(outcome.frames_processed, started.elapsed(), info.fps),
        };
        match store.save(&checkpoint) {
            Ok(()) => log::info!(
                "{}: checkpoint at frame {}/{} ({} detections)",
                source_id,
                iteration,
                info.total_frames,
                checkpoint.detections_count
            ),
            Err(err) => log::warn!("{}: checkpoint failed: {:#}", source_id, err),
        }
    }

    fn finish(&self, source_id: String, outcome: LoopOutcome, started: Instant, fps: f64) -> RunReport {
        let metrics = outcome
            .tally
            .metrics(outcome.frames_processed, started.elapsed(), fps);
        let status = if outcome.failure.is_some() {
            RunState::Failed
        } else {
            RunState::Completed
        };
        {
            let mut run = lock(&self.shared.run);
            run.state = status;
            run.metrics = metrics.clone();
        }
        log::info!(
            "{}: {} after {} frames, {} detections, {:.1} fps",
            source_id,
            status,
            metrics.frames_processed,
            metrics.total_detections,
            metrics.avg_fps
        );
        RunReport {
            source_id,
            status,
            stopped: outcome.stopped,
            frames_processed: outcome.frames_processed,
            error_count: outcome.error_count,
            metrics,
            detections_summary: outcome.tally.summary(),
            error: outcome.failure.as_ref().map(|f| f.to_string()),
            failure: outcome.failure,
        }
    }
}

/// Marks a run failed if `process` unwinds before the run settles, so a
/// panicking source cannot leave the processor stuck in `Running`.
struct SettleOnUnwind<'a>(&'a Shared);

impl Drop for SettleOnUnwind<'_> {
    fn drop(&mut self) {
        let mut run = lock(&self.0.run);
        if run.state.is_active() {
            log::error!(
                "{}: run aborted by a panic",
                run.source_id.as_deref().unwrap_or("unknown")
            );
            run.state = RunState::Failed;
        }
    }
}

/// Runs `f`, turning a panic into an ordinary per-frame error.
fn contain_panic<T>(what: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(anyhow!("{} panicked: {}", what, panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn frame_timestamp(frame_number: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        frame_number as f64 / fps
    } else {
        0.0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
