use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, ThreatCategory};

/// Run-level totals, also persisted inside checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_detections: u64,
    pub avg_confidence: f64,
    pub avg_fps: f64,
    pub processing_time_ms: f64,
    pub frames_processed: u64,
    /// Source duration implied by frames processed and declared fps.
    pub video_duration_sec: f64,
}

/// Per-category slice of a [`DetectionSummary`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: u64,
    pub avg_confidence: f64,
    pub max_confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total: u64,
    pub by_category: BTreeMap<ThreatCategory, CategoryStats>,
    pub highest_confidence: f64,
    pub avg_confidence: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    max: f64,
}

impl Accumulator {
    fn add(&mut self, confidence: f64) {
        self.count += 1;
        self.sum += confidence;
        self.max = self.max.max(confidence);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Running detection counters kept by the frame loop.
///
/// Totals are accumulated as frames settle so they survive history
/// trimming.
#[derive(Clone, Debug, Default)]
pub struct DetectionTally {
    overall: Accumulator,
    per_category: BTreeMap<ThreatCategory, Accumulator>,
}

impl DetectionTally {
    pub fn record(&mut self, detections: &[Detection]) {
        for detection in detections {
            self.overall.add(detection.confidence);
            self.per_category
                .entry(detection.category)
                .or_default()
                .add(detection.confidence);
        }
    }

    pub fn total(&self) -> u64 {
        self.overall.count
    }

    /// Aggregate metrics. `avg_fps` is frames over total elapsed time.
    pub fn metrics(&self, frames_processed: u64, elapsed: Duration, source_fps: f64) -> AggregateMetrics {
        let secs = elapsed.as_secs_f64();
        AggregateMetrics {
            total_detections: self.overall.count,
            avg_confidence: self.overall.mean(),
            avg_fps: if secs > 0.0 {
                frames_processed as f64 / secs
            } else {
                0.0
            },
            processing_time_ms: secs * 1000.0,
            frames_processed,
            video_duration_sec: if source_fps > 0.0 {
                frames_processed as f64 / source_fps
            } else {
                0.0
            },
        }
    }

    pub fn summary(&self) -> DetectionSummary {
        DetectionSummary {
            total: self.overall.count,
            by_category: self
                .per_category
                .iter()
                .map(|(category, acc)| {
                    (
                        *category,
                        CategoryStats {
                            count: acc.count,
                            avg_confidence: acc.mean(),
                            max_confidence: acc.max,
                        },
                    )
                })
                .collect(),
            highest_confidence: self.overall.max,
            avg_confidence: self.overall.mean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn detection(category: ThreatCategory, confidence: f64) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: 0,
                y1: 0,
                x2: 10,
                y2: 10,
            },
            confidence,
            category,
            signature: None,
        }
    }

    #[test]
    fn summary_groups_by_category() {
        let mut tally = DetectionTally::default();
        tally.record(&[
            detection(ThreatCategory::Vehicle, 0.5),
            detection(ThreatCategory::Vehicle, 0.7),
            detection(ThreatCategory::Personnel, 0.9),
        ]);
        let summary = tally.summary();
        assert_eq!(summary.total, 3);
        let vehicle = summary.by_category[&ThreatCategory::Vehicle];
        assert_eq!(vehicle.count, 2);
        assert!((vehicle.avg_confidence - 0.6).abs() < 1e-9);
        assert_eq!(vehicle.max_confidence, 0.7);
        assert_eq!(summary.highest_confidence, 0.9);
        assert!((summary.avg_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn metrics_use_total_elapsed_time() {
        let mut tally = DetectionTally::default();
        tally.record(&[detection(ThreatCategory::Aircraft, 0.95)]);
        let metrics = tally.metrics(50, Duration::from_secs(2), 25.0);
        assert_eq!(metrics.frames_processed, 50);
        assert_eq!(metrics.total_detections, 1);
        assert!((metrics.avg_fps - 25.0).abs() < 1e-9);
        assert!((metrics.video_duration_sec - 2.0).abs() < 1e-9);
        assert!((metrics.processing_time_ms - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn empty_tally_is_zeroed() {
        let tally = DetectionTally::default();
        let metrics = tally.metrics(0, Duration::ZERO, 0.0);
        assert_eq!(metrics, AggregateMetrics::default());
        let summary = tally.summary();
        assert!(summary.by_category.is_empty());
        assert_eq!(summary.highest_confidence, 0.0);
    }

    #[test]
    fn summary_serializes_category_keys() {
        let mut tally = DetectionTally::default();
        tally.record(&[detection(ThreatCategory::GenericSignature, 0.5)]);
        let json = serde_json::to_value(tally.summary()).unwrap();
        assert_eq!(json["by_category"]["generic_signature"]["count"], 1);
    }
}
