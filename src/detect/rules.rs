//! Ordered classification rule table. The first matching rule wins.

use super::hotspot::Hotspot;
use super::result::ThreatCategory;

/// One entry of the rule table: a predicate over hotspot features and the
/// confidence formula applied when it matches.
pub struct ClassificationRule {
    pub category: ThreatCategory,
    pub matches: fn(&HotspotFeatures) -> bool,
    pub confidence: fn(&HotspotFeatures) -> f64,
}

/// Features a rule may inspect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HotspotFeatures {
    pub area: f64,
    pub mean: f64,
    pub max: f64,
    pub aspect_ratio: f64,
}

impl From<&Hotspot> for HotspotFeatures {
    fn from(hotspot: &Hotspot) -> Self {
        Self {
            area: hotspot.area,
            mean: hotspot.mean_intensity,
            max: hotspot.max_intensity as f64,
            aspect_ratio: hotspot.aspect_ratio,
        }
    }
}

pub static RULES: [ClassificationRule; 5] = [
    // Large, warm, wider than tall.
    ClassificationRule {
        category: ThreatCategory::Vehicle,
        matches: |f| {
            (1000.0..=15000.0).contains(&f.area)
                && f.mean >= 180.0
                && f.max >= 200.0
                && f.aspect_ratio > 1.2
        },
        confidence: |f| (0.4 + (f.mean - 180.0) / 100.0).min(0.9),
    },
    // Body-heat sized, upright or square.
    ClassificationRule {
        category: ThreatCategory::Personnel,
        matches: |f| {
            (200.0..=2000.0).contains(&f.area)
                && f.mean >= 200.0
                && f.max >= 210.0
                && (0.3..=1.5).contains(&f.aspect_ratio)
        },
        confidence: |f| (0.5 + (f.mean - 200.0) / 50.0).min(0.9),
    },
    // Large with very hot engine cores.
    ClassificationRule {
        category: ThreatCategory::Aircraft,
        matches: |f| (2000.0..=25000.0).contains(&f.area) && f.max >= 230.0,
        confidence: |f| (0.6 + (f.max - 230.0) / 25.0).min(0.95),
    },
    ClassificationRule {
        category: ThreatCategory::Equipment,
        matches: |f| (500.0..=8000.0).contains(&f.area) && f.mean >= 160.0,
        confidence: |f| (0.3 + (f.mean - 160.0) / 60.0).min(0.8),
    },
    ClassificationRule {
        category: ThreatCategory::GenericSignature,
        matches: |f| f.area >= 150.0 && f.mean >= 140.0,
        confidence: |f| (0.2 + (f.mean - 140.0) / 80.0).min(0.7),
    },
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub category: ThreatCategory,
    pub confidence: f64,
}

/// Evaluate the table in order. Unmatched hotspots are `Unknown` with zero
/// confidence.
pub fn classify(features: &HotspotFeatures) -> Classification {
    RULES
        .iter()
        .find(|rule| (rule.matches)(features))
        .map(|rule| Classification {
            category: rule.category,
            confidence: (rule.confidence)(features).clamp(0.0, 1.0),
        })
        .unwrap_or(Classification {
            category: ThreatCategory::Unknown,
            confidence: 0.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::hotspot::{find_hotspots, Band};
    use crate::detect::mode::DetectionMode;
    use image::{GrayImage, Luma};

    fn features(area: f64, mean: f64, max: f64, aspect_ratio: f64) -> HotspotFeatures {
        HotspotFeatures {
            area,
            mean,
            max,
            aspect_ratio,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn warm_wide_rectangle_is_a_vehicle() {
        let c = classify(&features(4200.0, 190.0, 205.0, 1.67));
        assert_eq!(c.category, ThreatCategory::Vehicle);
        assert_close(c.confidence, 0.50);
    }

    #[test]
    fn small_round_hot_region_is_personnel() {
        let c = classify(&features(700.0, 215.0, 225.0, 1.0));
        assert_eq!(c.category, ThreatCategory::Personnel);
        assert_close(c.confidence, 0.80);
    }

    #[test]
    fn hot_large_square_is_aircraft() {
        let c = classify(&features(5000.0, 170.0, 245.0, 1.0));
        assert_eq!(c.category, ThreatCategory::Aircraft);
        assert_close(c.confidence, 0.95_f64.min(0.6 + 15.0 / 25.0));
    }

    #[test]
    fn vehicle_rule_wins_over_aircraft_when_both_match() {
        let c = classify(&features(3000.0, 200.0, 250.0, 2.0));
        assert_eq!(c.category, ThreatCategory::Vehicle);
        assert_close(c.confidence, 0.6);
    }

    #[test]
    fn equipment_and_generic_fallbacks() {
        let eq = classify(&features(600.0, 190.0, 195.0, 3.0));
        assert_eq!(eq.category, ThreatCategory::Equipment);
        assert_close(eq.confidence, 0.8);

        let generic = classify(&features(160.0, 150.0, 160.0, 1.0));
        assert_eq!(generic.category, ThreatCategory::GenericSignature);
        assert_close(generic.confidence, 0.325);
    }

    #[test]
    fn cold_regions_are_unknown() {
        let c = classify(&features(5000.0, 100.0, 120.0, 1.0));
        assert_eq!(c.category, ThreatCategory::Unknown);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn confidence_caps_apply() {
        let c = classify(&features(1500.0, 250.0, 255.0, 0.8));
        assert_eq!(c.category, ThreatCategory::Personnel);
        assert_close(c.confidence, 0.9);
    }

    fn paint(image: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32, value: u8) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, Luma([value]));
            }
        }
    }

    fn only_hotspot(image: &GrayImage) -> Hotspot {
        let mut hotspots = find_hotspots(image, DetectionMode::Balanced.morph_kernel());
        assert_eq!(hotspots.len(), 1, "{hotspots:?}");
        hotspots.remove(0)
    }

    #[test]
    fn warm_wide_block_in_a_frame_is_a_vehicle() {
        let mut image = GrayImage::new(160, 120);
        paint(&mut image, 20, 20, 85, 51, 190);
        // Hot and cool patches cancel out in the mean.
        paint(&mut image, 40, 40, 4, 4, 210);
        paint(&mut image, 70, 40, 4, 4, 170);

        let spot = only_hotspot(&image);
        assert_eq!(spot.band, Band::Medium);
        assert!((4150.0..4200.0).contains(&spot.area), "area {}", spot.area);
        assert_close(spot.aspect_ratio, 85.0 / 51.0);
        assert_close(spot.mean_intensity, 190.0);
        assert_eq!(spot.max_intensity, 210);

        let c = classify(&HotspotFeatures::from(&spot));
        assert_eq!(c.category, ThreatCategory::Vehicle);
        assert_close(c.confidence, 0.50);
    }

    #[test]
    fn body_sized_warm_block_in_a_frame_is_personnel() {
        let mut image = GrayImage::new(120, 120);
        paint(&mut image, 40, 40, 27, 27, 215);

        let spot = only_hotspot(&image);
        assert!((600.0..=700.0).contains(&spot.area), "area {}", spot.area);
        assert_close(spot.aspect_ratio, 1.0);
        assert_close(spot.mean_intensity, 215.0);

        let c = classify(&HotspotFeatures::from(&spot));
        assert_eq!(c.category, ThreatCategory::Personnel);
        assert_close(c.confidence, 0.80);
    }
}
