use sysinfo::{Pid, System};

use crate::frame::{FrameHistory, DEFAULT_HISTORY_FRAMES};

pub const DEFAULT_MEMORY_LIMIT_MB: f64 = 2048.0;
pub const DEFAULT_MEMORY_CHECK_INTERVAL: u64 = 50;

/// Source of resident-memory readings for the current process.
pub trait MemorySampler: Send {
    /// Resident set size in MiB, or `None` when it cannot be read.
    fn resident_mb(&mut self) -> Option<f64>;
}

/// Reads the process RSS through `sysinfo`.
pub struct ProcessMemorySampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                log::warn!("memory sampling disabled: {}", err);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn resident_mb(&mut self) -> Option<f64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system
            .process(pid)
            .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
    }
}

/// Fixed reading, for tests and platforms without process stats.
#[derive(Clone, Copy, Debug)]
pub struct FixedMemorySampler(pub Option<f64>);

impl MemorySampler for FixedMemorySampler {
    fn resident_mb(&mut self) -> Option<f64> {
        self.0
    }
}

/// Outcome of one guard check.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryCheck {
    pub resident_mb: Option<f64>,
    pub trimmed: usize,
}

/// Bounds process memory by trimming frame history past a limit.
///
/// Only history is reclaimed; in-flight frame state is never touched.
pub struct MemoryGuard {
    sampler: Box<dyn MemorySampler>,
    limit_mb: f64,
    retain_frames: usize,
    check_interval: u64,
}

impl MemoryGuard {
    pub fn new(sampler: Box<dyn MemorySampler>, limit_mb: f64, retain_frames: usize, check_interval: u64) -> Self {
        Self {
            sampler,
            limit_mb,
            retain_frames,
            check_interval: check_interval.max(1),
        }
    }

    /// Whether the iteration counter has reached a check boundary.
    pub fn is_due(&self, iteration: u64) -> bool {
        iteration > 0 && iteration % self.check_interval == 0
    }

    /// Trims `history` if `resident_mb` is over the limit. Returns the
    /// number of records dropped.
    fn enforce(&mut self, resident_mb: Option<f64>, history: &mut FrameHistory) -> usize {
        let Some(resident) = resident_mb else {
            return 0;
        };
        if resident <= self.limit_mb {
            return 0;
        }
        let dropped = history.trim_to(self.retain_frames);
        history.shrink_to_fit();
        log::warn!(
            "memory {:.0} MiB over limit {:.0} MiB; dropped {} history records",
            resident,
            self.limit_mb,
            dropped
        );
        dropped
    }

    /// Sample resident memory and trim `history` when over the limit.
    pub fn check(&mut self, history: &mut FrameHistory) -> MemoryCheck {
        let resident_mb = self.sampler.resident_mb();
        let trimmed = self.enforce(resident_mb, history);
        MemoryCheck {
            resident_mb,
            trimmed,
        }
    }
}

impl Default for MemoryGuard {
    fn default() -> Self {
        Self::new(
            Box::new(ProcessMemorySampler::new()),
            DEFAULT_MEMORY_LIMIT_MB,
            DEFAULT_HISTORY_FRAMES,
            DEFAULT_MEMORY_CHECK_INTERVAL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FramePerformance;
    use crate::frame::FrameResult;

    fn history_with(frames: u64) -> FrameHistory {
        let mut history = FrameHistory::new(10_000);
        for frame_number in 0..frames {
            history.push(FrameResult {
                frame_number,
                timestamp: 0.0,
                detections: Vec::new(),
                performance: FramePerformance::default(),
                consecutive_errors: 0,
            });
        }
        history
    }

    #[test]
    fn cadence_skips_zero() {
        let guard = MemoryGuard::new(Box::new(FixedMemorySampler(None)), 10.0, 5, 50);
        assert!(!guard.is_due(0));
        assert!(!guard.is_due(49));
        assert!(guard.is_due(50));
        assert!(guard.is_due(100));
    }

    #[test]
    fn keeps_newest_records_when_over_limit() {
        let mut guard = MemoryGuard::new(Box::new(FixedMemorySampler(Some(4096.0))), 2048.0, 5, 50);
        let mut history = history_with(20);
        let check = guard.check(&mut history);
        assert_eq!(check.trimmed, 15);
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter().next().map(|r| r.frame_number), Some(15));
        assert_eq!(check.resident_mb, Some(4096.0));
    }

    #[test]
    fn leaves_history_alone_under_limit() {
        let mut guard = MemoryGuard::new(Box::new(FixedMemorySampler(Some(100.0))), 2048.0, 5, 50);
        let mut history = history_with(20);
        let check = guard.check(&mut history);
        assert_eq!(check.trimmed, 0);
        assert_eq!(check.resident_mb, Some(100.0));
        assert_eq!(history.len(), 20);
    }

    #[test]
    fn missing_reading_is_not_fatal() {
        let mut guard = MemoryGuard::new(Box::new(FixedMemorySampler(None)), 1.0, 5, 50);
        let mut history = history_with(20);
        let check = guard.check(&mut history);
        assert_eq!(check, MemoryCheck::default());
        assert_eq!(history.len(), 20);
    }

    #[test]
    fn process_sampler_reads_something() {
        let mut sampler = ProcessMemorySampler::new();
        if let Some(mb) = sampler.resident_mb() {
            assert!(mb > 0.0);
        }
    }
}
