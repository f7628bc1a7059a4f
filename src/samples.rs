use serde::{Deserialize, Serialize};

/// Location fix from the platform location service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level
    pub altitude: f64,
    /// Sensor-reported ground speed in m/s. Negative means invalid.
    pub speed: f64,
    /// Radius of uncertainty in meters. Negative means invalid.
    pub horizontal_accuracy: f64,
}

impl PositionSample {
    pub fn new(
        timestamp: f64,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        speed: f64,
        horizontal_accuracy: f64,
    ) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude,
            speed,
            horizontal_accuracy,
        }
    }

    /// Synthetic stationary fix used in fixed-location mode
    pub fn fixed(timestamp: f64, latitude: f64, longitude: f64) -> Self {
        Self::new(timestamp, latitude, longitude, 0.0, 0.0, 0.0)
    }

    /// Whether this fix may feed distance/speed tracking.
    ///
    /// Rejects non-finite coordinates, coordinates outside WGS84 range and
    /// fixes whose accuracy is unknown or worse than `max_accuracy_m`.
    pub fn is_usable(&self, max_accuracy_m: f64) -> bool {
        if !self.timestamp.is_finite() {
            return false;
        }
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return false;
        }
        if self.latitude.abs() > 90.0 || self.longitude.abs() > 180.0 {
            return false;
        }
        self.horizontal_accuracy.is_finite()
            && self.horizontal_accuracy >= 0.0
            && self.horizontal_accuracy <= max_accuracy_m
    }
}

/// Accelerometer-derived activity reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub timestamp: f64,
    pub magnitude: f64,
}

impl MotionSample {
    pub fn new(timestamp: f64, magnitude: f64) -> Self {
        Self {
            timestamp,
            magnitude,
        }
    }

    /// Build from raw axes: magnitude is `|ax| + |ay| + |az|`
    pub fn from_axes(timestamp: f64, ax: f64, ay: f64, az: f64) -> Self {
        Self::new(timestamp, ax.abs() + ay.abs() + az.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_magnitude_is_l1_norm() {
        let sample = MotionSample::from_axes(0.0, 0.5, -0.25, -1.0);
        assert_eq!(sample.magnitude, 1.75);
    }

    #[test]
    fn test_position_validity() {
        let good = PositionSample::new(1.0, 46.5, 7.9, 2000.0, 3.0, 8.0);
        assert!(good.is_usable(50.0));

        let nan_lat = PositionSample::new(1.0, f64::NAN, 7.9, 2000.0, 3.0, 8.0);
        assert!(!nan_lat.is_usable(50.0));

        let inf_lon = PositionSample::new(1.0, 46.5, f64::INFINITY, 2000.0, 3.0, 8.0);
        assert!(!inf_lon.is_usable(50.0));

        let coarse = PositionSample::new(1.0, 46.5, 7.9, 2000.0, 3.0, 65.0);
        assert!(!coarse.is_usable(50.0));

        let unknown_accuracy = PositionSample::new(1.0, 46.5, 7.9, 2000.0, 3.0, -1.0);
        assert!(!unknown_accuracy.is_usable(50.0));

        let out_of_range = PositionSample::new(1.0, 91.0, 7.9, 2000.0, 3.0, 5.0);
        assert!(!out_of_range.is_usable(50.0));
    }

    #[test]
    fn test_fixed_sample_is_stationary() {
        let sample = PositionSample::fixed(10.0, 46.5, 7.9);
        assert_eq!(sample.speed, 0.0);
        assert_eq!(sample.altitude, 0.0);
        assert!(sample.is_usable(0.0));
    }
}
