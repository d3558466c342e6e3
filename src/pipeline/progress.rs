//! Progress reporting for long-running frame loops.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

pub const DEFAULT_PROGRESS_QUEUE: usize = 64;

/// Snapshot emitted after every settled frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub progress_percent: f64,
    pub current_frame: u64,
    pub total_frames: u64,
    pub detections_so_far: u64,
    pub current_fps: f64,
    pub memory_mb: Option<f64>,
    pub error_count: u32,
}

/// Receiver of progress events.
///
/// Implementations must return promptly; the frame loop calls this inline.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Forwards events over a bounded channel, dropping them when the
/// consumer falls behind.
#[derive(Debug)]
pub struct ChannelProgressSink {
    tx: Sender<ProgressEvent>,
    dropped: AtomicU64,
}

impl ChannelProgressSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Events lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::trace!("progress consumer gone; event discarded");
            }
        }
    }
}
