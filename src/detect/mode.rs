use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Detector tuning profile.
///
/// Larger kernels smooth more noise at the cost of throughput and demand a
/// higher confidence before a classification is reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Speed,
    #[default]
    Balanced,
    Accuracy,
}

impl DetectionMode {
    /// Gaussian smoothing kernel side, always odd.
    pub fn blur_kernel(self) -> usize {
        match self {
            DetectionMode::Speed => 3,
            DetectionMode::Balanced => 5,
            DetectionMode::Accuracy => 7,
        }
    }

    /// Elliptical structuring element side for mask close/open.
    pub fn morph_kernel(self) -> usize {
        self.blur_kernel()
    }

    pub fn min_confidence(self) -> f64 {
        match self {
            DetectionMode::Speed => 0.3,
            DetectionMode::Balanced => 0.4,
            DetectionMode::Accuracy => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::Speed => "speed",
            DetectionMode::Balanced => "balanced",
            DetectionMode::Accuracy => "accuracy",
        }
    }
}

impl FromStr for DetectionMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(DetectionMode::Speed),
            "balanced" => Ok(DetectionMode::Balanced),
            "accuracy" => Ok(DetectionMode::Accuracy),
            other => Err(anyhow!(
                "unknown detection mode '{}' (expected speed|balanced|accuracy)",
                other
            )),
        }
    }
}

impl std::fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parameters() {
        assert_eq!(DetectionMode::Speed.blur_kernel(), 3);
        assert_eq!(DetectionMode::Balanced.blur_kernel(), 5);
        assert_eq!(DetectionMode::Accuracy.morph_kernel(), 7);
        assert_eq!(DetectionMode::Speed.min_confidence(), 0.3);
        assert_eq!(DetectionMode::Balanced.min_confidence(), 0.4);
        assert_eq!(DetectionMode::Accuracy.min_confidence(), 0.5);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(
            "Accuracy".parse::<DetectionMode>().unwrap(),
            DetectionMode::Accuracy
        );
        assert!("turbo".parse::<DetectionMode>().is_err());
    }
}
