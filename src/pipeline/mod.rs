//! Resilient frame loop: run state, error escalation, memory bounds,
//! checkpoint cadence and progress reporting.

pub mod errors;
pub mod memory;
pub mod metrics;
pub mod processor;
pub mod progress;
pub mod state;

pub use errors::{ErrorPolicy, Escalation, FailureReason, FrameError, StartError};
pub use memory::{FixedMemorySampler, MemoryCheck, MemoryGuard, MemorySampler, ProcessMemorySampler};
pub use metrics::{AggregateMetrics, CategoryStats, DetectionSummary, DetectionTally};
pub use processor::{FrameProcessor, ProcessorOptions, RunReport, StopHandle};
pub use progress::{ChannelProgressSink, NullProgressSink, ProgressEvent, ProgressSink};
pub use state::{ProcessingStatus, RunState};
