use serde::Serialize;

use super::metrics::AggregateMetrics;

/// Lifecycle of the frame processor.
///
/// `Idle -> Running -> {StopRequested ->} Completed | Failed`, and back to
/// `Running` on the next start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    StopRequested,
    Completed,
    Failed,
}

impl RunState {
    /// A run owns the processor in these states.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::StopRequested)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::StopRequested => "stop_requested",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the processor, safe to take from any thread.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessingStatus {
    pub state: RunState,
    pub is_processing: bool,
    pub source_id: Option<String>,
    pub current_frame: u64,
    pub total_frames: u64,
    pub progress_percent: f64,
    pub frames_retained: usize,
    pub detections_so_far: u64,
    pub consecutive_errors: u32,
    pub memory_mb: Option<f64>,
    pub metrics: AggregateMetrics,
}

/// Percentage of declared frames reached, clamped to 100.
pub fn progress_percent(current_frame: u64, total_frames: u64) -> f64 {
    if total_frames == 0 {
        0.0
    } else {
        (current_frame as f64 / total_frames as f64 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(RunState::Running.is_active());
        assert!(RunState::StopRequested.is_active());
        assert!(!RunState::Idle.is_active());
        assert!(!RunState::Completed.is_active());
        assert!(!RunState::Failed.is_active());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_percent(5, 0), 0.0);
        assert_eq!(progress_percent(25, 100), 25.0);
        assert_eq!(progress_percent(150, 100), 100.0);
    }
}
