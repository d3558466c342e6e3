use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::ThermalFrame;

/// Detector backend trait.
///
/// Backends treat each frame independently: no state may carry over between
/// calls other than tuning parameters fixed at construction. The frame loop
/// relies on this to replay or skip frames without corrupting results.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a single-channel intensity frame.
    ///
    /// Errors are reported per frame; the caller decides whether they are
    /// recoverable.
    fn detect(&mut self, frame: &ThermalFrame) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
