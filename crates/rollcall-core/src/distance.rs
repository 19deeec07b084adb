//! Camera-to-face distance estimation and gating classification.
//!
//! Uses the pinhole proportionality `distance = real_height * focal / pixel_height`.
//! Without an offline focal-length calibration the focal length is implied
//! from the observed height itself, which cancels to the calibration distance.

/// Average adult face height.
pub const REFERENCE_FACE_HEIGHT_CM: f32 = 20.0;
/// Distance at which the reference height was calibrated.
pub const CALIBRATION_DISTANCE_CM: f32 = 60.0;
pub const OPTIMAL_DISTANCE_CM: i32 = 60;
pub const DISTANCE_TOLERANCE_CM: i32 = 15;

/// Where a face sits relative to the optimal recognition distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceStatus {
    Good,
    /// Closer than the acceptable band.
    MoveBack,
    /// Further than the acceptable band.
    MoveCloser,
}

impl DistanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceStatus::Good => "Good Distance",
            DistanceStatus::MoveBack => "Move Back",
            DistanceStatus::MoveCloser => "Move Closer",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceEstimator {
    pub reference_height_cm: f32,
    pub calibration_distance_cm: f32,
    /// Offline-calibrated focal length in pixels. `None` keeps the self-implied focal length.
    pub focal_length_px: Option<f32>,
    pub optimal_cm: i32,
    pub tolerance_cm: i32,
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self {
            reference_height_cm: REFERENCE_FACE_HEIGHT_CM,
            calibration_distance_cm: CALIBRATION_DISTANCE_CM,
            focal_length_px: None,
            optimal_cm: OPTIMAL_DISTANCE_CM,
            tolerance_cm: DISTANCE_TOLERANCE_CM,
        }
    }
}

impl DistanceEstimator {
    /// Estimate distance in whole centimeters from a face height in pixels.
    ///
    /// Returns `None` for non-positive or non-finite heights.
    pub fn estimate(&self, face_height_px: f32) -> Option<i32> {
        if !face_height_px.is_finite() || face_height_px <= 0.0 {
            return None;
        }
        let h = face_height_px as f64;
        let focal = match self.focal_length_px {
            Some(f) => f as f64,
            None => h * self.calibration_distance_cm as f64 / self.reference_height_cm as f64,
        };
        let distance = self.reference_height_cm as f64 * focal / h;
        // Round rather than truncate: the implied-focal path must not drift to 59.
        Some(distance.round() as i32)
    }

    /// Classify a distance against `optimal_cm ± tolerance_cm` (inclusive).
    pub fn classify(&self, distance_cm: i32) -> DistanceStatus {
        if (distance_cm - self.optimal_cm).abs() <= self.tolerance_cm {
            DistanceStatus::Good
        } else if distance_cm < self.optimal_cm {
            DistanceStatus::MoveBack
        } else {
            DistanceStatus::MoveCloser
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implied_focal_always_returns_calibration_distance() {
        let est = DistanceEstimator::default();
        for h in [1.0f32, 3.0, 7.0, 33.3, 97.0, 151.0, 480.0, 1234.5] {
            assert_eq!(est.estimate(h), Some(60), "height {h}");
        }
    }

    #[test]
    fn test_non_positive_height_is_rejected() {
        let est = DistanceEstimator::default();
        assert_eq!(est.estimate(0.0), None);
        assert_eq!(est.estimate(-4.0), None);
        assert_eq!(est.estimate(f32::NAN), None);
    }

    #[test]
    fn test_fixed_focal_length() {
        let est = DistanceEstimator {
            focal_length_px: Some(600.0),
            ..Default::default()
        };
        // 20cm * 600px / 200px = 60cm
        assert_eq!(est.estimate(200.0), Some(60));
        assert_eq!(est.estimate(100.0), Some(120));
        assert_eq!(est.estimate(400.0), Some(30));
    }

    #[test]
    fn test_classification_boundaries() {
        let est = DistanceEstimator::default();
        assert_eq!(est.classify(45), DistanceStatus::Good);
        assert_eq!(est.classify(60), DistanceStatus::Good);
        assert_eq!(est.classify(75), DistanceStatus::Good);
        assert_eq!(est.classify(44), DistanceStatus::MoveBack);
        assert_eq!(est.classify(76), DistanceStatus::MoveCloser);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(DistanceStatus::Good.as_str(), "Good Distance");
        assert_eq!(DistanceStatus::MoveBack.as_str(), "Move Back");
        assert_eq!(DistanceStatus::MoveCloser.as_str(), "Move Closer");
    }
}
