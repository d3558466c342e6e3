use anyhow::Result;
use std::time::Instant;

use crate::detect::backend::DetectorBackend;
use crate::detect::hotspot::find_hotspots;
use crate::detect::mode::DetectionMode;
use crate::detect::preprocess::preprocess;
use crate::detect::result::{
    Detection, DetectionResult, FramePerformance, ThermalSignature, ThreatCategory,
};
use crate::detect::rules::{classify, HotspotFeatures};
use crate::frame::ThermalFrame;

/// Upper bound on detections reported for a single frame.
pub const MAX_DETECTIONS_PER_FRAME: usize = 20;

/// Threshold/contour hotspot detector for 8-bit thermal frames.
#[derive(Clone, Debug, Default)]
pub struct ThermalDetector {
    mode: DetectionMode,
}

impl ThermalDetector {
    pub fn new(mode: DetectionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Pure detection over a validated frame.
    pub fn detect_frame(&self, frame: &ThermalFrame) -> Result<DetectionResult> {
        let start = Instant::now();
        let image = frame.to_image()?;
        let processed = preprocess(&image, self.mode.blur_kernel());
        let hotspots = find_hotspots(&processed, self.mode.morph_kernel());

        let min_confidence = self.mode.min_confidence();
        let mut detections: Vec<Detection> = hotspots
            .iter()
            .filter_map(|hotspot| {
                let classification = classify(&HotspotFeatures::from(hotspot));
                if classification.category == ThreatCategory::Unknown
                    || classification.confidence < min_confidence
                {
                    return None;
                }
                Some(Detection {
                    bbox: hotspot.bbox,
                    confidence: classification.confidence,
                    category: classification.category,
                    signature: Some(ThermalSignature {
                        mean_intensity: hotspot.mean_intensity,
                        max_intensity: hotspot.max_intensity,
                        area: hotspot.area,
                    }),
                })
            })
            .collect();

        // Stable sort keeps band order among equal confidences.
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(MAX_DETECTIONS_PER_FRAME);

        log::trace!(
            "thermal detector: {} hotspots, {} detections",
            hotspots.len(),
            detections.len()
        );

        let performance = FramePerformance::measure(&detections, start.elapsed());
        Ok(DetectionResult {
            detections,
            performance,
        })
    }
}

impl DetectorBackend for ThermalDetector {
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn detect(&mut self, frame: &ThermalFrame) -> Result<DetectionResult> {
        self.detect_frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::synthetic::test_frame;

    fn block_frame(value: u8, x0: u32, y0: u32, w: u32, h: u32) -> ThermalFrame {
        let (width, height) = (160u32, 120u32);
        let mut pixels = vec![85u8; (width * height) as usize];
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                pixels[(y * width + x) as usize] = value;
            }
        }
        ThermalFrame::new(pixels, width, height).unwrap()
    }

    #[test]
    fn synthetic_scene_yields_bounded_ranked_detections() {
        let mut detector = ThermalDetector::new(DetectionMode::Balanced);
        let result = detector.detect(&test_frame()).unwrap();

        assert!(!result.detections.is_empty());
        assert!(result.detections.len() <= MAX_DETECTIONS_PER_FRAME);
        for pair in result.detections.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        for det in &result.detections {
            assert!((0.0..=1.0).contains(&det.confidence));
            assert!(det.confidence >= DetectionMode::Balanced.min_confidence());
            assert_ne!(det.category, ThreatCategory::Unknown);
            assert!(det.bbox.x1 < det.bbox.x2 && det.bbox.y1 < det.bbox.y2);
        }
        assert_eq!(result.performance.detections_count, result.detections.len());
    }

    #[test]
    fn detection_is_deterministic() {
        let detector = ThermalDetector::new(DetectionMode::Accuracy);
        let frame = test_frame();
        let first = detector.detect_frame(&frame).unwrap();
        let second = detector.detect_frame(&frame).unwrap();
        assert_eq!(first.detections, second.detections);
    }

    #[test]
    fn hot_block_is_reported() {
        let mut detector = ThermalDetector::new(DetectionMode::Speed);
        let result = detector.detect(&block_frame(250, 40, 30, 60, 50)).unwrap();
        let top = result.detections.first().expect("at least one detection");
        let signature = top.signature.expect("signature");
        assert!(signature.max_intensity >= 240);
        assert!(signature.area > 2000.0);
    }

    #[test]
    fn cold_frame_has_no_detections() {
        let mut detector = ThermalDetector::default();
        let frame = ThermalFrame::new(vec![60u8; 64 * 48], 64, 48).unwrap();
        let result = detector.detect(&frame).unwrap();
        assert!(result.detections.is_empty());
        assert_eq!(result.performance.avg_confidence, 0.0);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let mut detector = ThermalDetector::default();
        let rgb = ThermalFrame::with_channels(vec![0u8; 4 * 4 * 3], 4, 4, 3);
        assert!(detector.detect(&rgb).is_err());
        let empty = ThermalFrame::with_channels(vec![], 0, 0, 1);
        assert!(detector.detect(&empty).is_err());
    }
}
