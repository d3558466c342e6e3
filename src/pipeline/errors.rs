use serde::Serialize;
use thiserror::Error;

/// Default consecutive-failure ceiling.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Rejection at run start. The in-flight run is left untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("a run is already in progress")]
    AlreadyRunning,
}

/// Recoverable per-frame failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The detector raised for this frame; an empty result is substituted.
    #[error("detection failed on frame {frame}: {reason}")]
    Detection { frame: u64, reason: String },
    /// The frame could not be obtained; it is skipped.
    #[error("frame {frame} could not be read: {reason}")]
    Iteration { frame: u64, reason: String },
}

/// Why a run ended in `Failed`.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("could not open source: {message}")]
    SourceOpen { message: String },
    #[error("too many consecutive errors ({count}); last: {last_error}")]
    ConsecutiveFailures { count: u32, last_error: String },
}

/// Decision after a per-frame failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Continue,
    Abort,
}

/// Tracks consecutive per-frame failures and escalates at the ceiling.
///
/// Only an uninterrupted streak counts; any fully successful frame resets
/// it.
#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    max_consecutive: u32,
    consecutive: u32,
    total: u64,
    last_error: Option<FrameError>,
}

impl ErrorPolicy {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive: max_consecutive.max(1),
            consecutive: 0,
            total: 0,
            last_error: None,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn record_failure(&mut self, error: FrameError) -> Escalation {
        self.consecutive += 1;
        self.total += 1;
        log::warn!(
            "{} (consecutive {}/{})",
            error,
            self.consecutive,
            self.max_consecutive
        );
        self.last_error = Some(error);
        if self.consecutive >= self.max_consecutive {
            Escalation::Abort
        } else {
            Escalation::Continue
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn total_failures(&self) -> u64 {
        self.total
    }

    /// Failure reason for an escalated streak.
    pub fn failure_reason(&self) -> FailureReason {
        FailureReason::ConsecutiveFailures {
            count: self.consecutive,
            last_error: self
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONSECUTIVE_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection_error(frame: u64) -> FrameError {
        FrameError::Detection {
            frame,
            reason: "boom".into(),
        }
    }

    #[test]
    fn aborts_exactly_at_ceiling() {
        let mut policy = ErrorPolicy::new(5);
        for frame in 0..4 {
            assert_eq!(policy.record_failure(detection_error(frame)), Escalation::Continue);
        }
        assert_eq!(policy.record_failure(detection_error(4)), Escalation::Abort);
        assert_eq!(policy.consecutive(), 5);
        match policy.failure_reason() {
            FailureReason::ConsecutiveFailures { count, last_error } => {
                assert_eq!(count, 5);
                assert!(last_error.contains("frame 4"));
            }
            other => panic!("unexpected reason {other:?}"),
        }
    }

    #[test]
    fn success_resets_the_streak() {
        let mut policy = ErrorPolicy::new(5);
        for frame in 0..12 {
            if frame % 2 == 0 {
                assert_eq!(policy.record_failure(detection_error(frame)), Escalation::Continue);
            } else {
                policy.record_success();
            }
        }
        assert_eq!(policy.consecutive(), 0);
        assert_eq!(policy.total_failures(), 6);
    }

    #[test]
    fn failure_reason_message() {
        let reason = FailureReason::ConsecutiveFailures {
            count: 5,
            last_error: "x".into(),
        };
        assert!(reason.to_string().starts_with("too many consecutive errors"));
    }
}
