use serde::{Deserialize, Serialize};

/// Threat category assigned to a classified hotspot.
///
/// The set is closed: every detection carries exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Personnel,
    Vehicle,
    Aircraft,
    Equipment,
    GenericSignature,
    Unknown,
}

impl ThreatCategory {
    pub const ALL: [ThreatCategory; 6] = [
        ThreatCategory::Personnel,
        ThreatCategory::Vehicle,
        ThreatCategory::Aircraft,
        ThreatCategory::Equipment,
        ThreatCategory::GenericSignature,
        ThreatCategory::Unknown,
    ];

    /// Stable numeric class id used by downstream consumers.
    pub fn class_id(self) -> u8 {
        match self {
            ThreatCategory::Personnel => 0,
            ThreatCategory::Vehicle => 1,
            ThreatCategory::Aircraft => 2,
            ThreatCategory::Equipment => 3,
            ThreatCategory::GenericSignature => 4,
            ThreatCategory::Unknown => 99,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatCategory::Personnel => "personnel",
            ThreatCategory::Vehicle => "vehicle",
            ThreatCategory::Aircraft => "aircraft",
            ThreatCategory::Equipment => "equipment",
            ThreatCategory::GenericSignature => "generic_signature",
            ThreatCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Width over height. Degenerate boxes report 1.0.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height() == 0 {
            1.0
        } else {
            self.width() as f64 / self.height() as f64
        }
    }
}

/// Intensity summary of the region a detection was derived from.
///
/// Values are raw 8-bit sensor levels, not calibrated temperatures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThermalSignature {
    pub mean_intensity: f64,
    pub max_intensity: u8,
    pub area: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Always within `0.0..=1.0`.
    pub confidence: f64,
    pub category: ThreatCategory,
    pub signature: Option<ThermalSignature>,
}

impl Detection {
    pub fn class_id(&self) -> u8 {
        self.category.class_id()
    }
}

/// Per-frame detector timing and yield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FramePerformance {
    pub fps: f64,
    pub inference_time_ms: f64,
    pub detections_count: usize,
    pub avg_confidence: f64,
}

impl FramePerformance {
    pub(crate) fn measure(detections: &[Detection], elapsed: std::time::Duration) -> Self {
        let inference_time_ms = elapsed.as_secs_f64() * 1000.0;
        let avg_confidence = if detections.is_empty() {
            0.0
        } else {
            detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
        };
        Self {
            fps: if inference_time_ms > 0.0 {
                1000.0 / inference_time_ms
            } else {
                0.0
            },
            inference_time_ms,
            detections_count: detections.len(),
            avg_confidence,
        }
    }
}

/// Output of one detector call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Confidence-descending, at most `MAX_DETECTIONS_PER_FRAME` entries.
    pub detections: Vec<Detection>,
    pub performance: FramePerformance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_are_stable() {
        assert_eq!(ThreatCategory::Personnel.class_id(), 0);
        assert_eq!(ThreatCategory::Vehicle.class_id(), 1);
        assert_eq!(ThreatCategory::Aircraft.class_id(), 2);
        assert_eq!(ThreatCategory::Equipment.class_id(), 3);
        assert_eq!(ThreatCategory::GenericSignature.class_id(), 4);
        assert_eq!(ThreatCategory::Unknown.class_id(), 99);
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ThreatCategory::GenericSignature).unwrap();
        assert_eq!(json, "\"generic_signature\"");
    }

    #[test]
    fn degenerate_box_aspect_is_one() {
        let bbox = BoundingBox {
            x1: 4,
            y1: 4,
            x2: 10,
            y2: 4,
        };
        assert_eq!(bbox.aspect_ratio(), 1.0);
    }
}
