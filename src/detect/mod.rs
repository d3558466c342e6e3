//! Thermal hotspot detection.
//!
//! A frame is smoothed and contrast-enhanced, thresholded into three fixed
//! intensity bands, cleaned with morphology, and each remaining region is
//! classified by an ordered rule table.

mod backend;
mod backends;
pub mod hotspot;
pub mod mode;
pub mod preprocess;
mod result;
pub mod rules;

pub use backend::DetectorBackend;
pub use backends::thermal::MAX_DETECTIONS_PER_FRAME;
pub use backends::ThermalDetector;
pub use hotspot::{Band, Hotspot};
pub use mode::DetectionMode;
pub use result::{
    BoundingBox, Detection, DetectionResult, FramePerformance, ThermalSignature, ThreatCategory,
};
pub use rules::{classify, Classification, ClassificationRule, HotspotFeatures};
