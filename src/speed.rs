use serde::{Deserialize, Serialize};

use crate::samples::PositionSample;

/// Where the tracker takes its readings from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LocationMode {
    Live,
    /// Simulated single-point location, live updates suppressed
    Fixed { latitude: f64, longitude: f64 },
}

/// Instantaneous speed and elevation from the most recent fix
#[derive(Debug, Clone)]
pub struct SpeedElevationTracker {
    mode: LocationMode,
    latest: Option<PositionSample>,
}

impl SpeedElevationTracker {
    pub fn new() -> Self {
        Self {
            mode: LocationMode::Live,
            latest: None,
        }
    }

    /// Take a live fix. Ignored while a fixed location is set.
    pub fn update(&mut self, sample: PositionSample) {
        if let LocationMode::Fixed { .. } = self.mode {
            return;
        }
        self.latest = Some(sample);
    }

    /// Ground speed in m/s; negative sensor speeds read as zero
    pub fn current_speed(&self) -> f64 {
        self.latest.map(|s| s.speed.max(0.0)).unwrap_or(0.0)
    }

    /// Altitude of the latest fix in meters
    pub fn current_elevation(&self) -> f64 {
        self.latest.map(|s| s.altitude).unwrap_or(0.0)
    }

    pub fn set_fixed_location(&mut self, latitude: f64, longitude: f64, timestamp: f64) {
        self.mode = LocationMode::Fixed {
            latitude,
            longitude,
        };
        self.latest = Some(PositionSample::fixed(timestamp, latitude, longitude));
    }

    /// Return to live mode. Readings stay at the fixed values until the next
    /// live fix arrives.
    pub fn clear_fixed_location(&mut self) {
        self.mode = LocationMode::Live;
    }

    pub fn mode(&self) -> LocationMode {
        self.mode
    }

    pub fn latest(&self) -> Option<&PositionSample> {
        self.latest.as_ref()
    }
}

impl Default for SpeedElevationTracker {
    fn default() -> Self {
        Self::new()
    }
}
