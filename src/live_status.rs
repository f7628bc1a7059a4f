use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::inactivity::{ActivityPhase, InactivityState};
use crate::samples::PositionSample;
use crate::session::{SessionSnapshot, SessionState};
use crate::speed::LocationMode;
use crate::timer::current_timestamp;

/// Periodic status dump for dashboards tailing the output directory
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    // Session
    pub session_id: Option<String>,
    pub route_name: Option<String>,
    pub session_state: SessionState,
    pub elapsed_seconds: u64,
    pub distance_meters: f64,
    pub current_speed: f64,
    pub top_speed: f64,
    pub elevation_meters: f64,
    pub position_fixes: u64,
    pub fixed_location: bool,
    // GPS data
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub gps_accuracy: f64,
    // Inactivity
    pub activity_phase: Option<ActivityPhase>,
    pub idle_seconds: f64,
    pub alerts_dispatched: u64,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            session_id: None,
            route_name: None,
            session_state: SessionState::Idle,
            elapsed_seconds: 0,
            distance_meters: 0.0,
            current_speed: 0.0,
            top_speed: 0.0,
            elevation_meters: 0.0,
            position_fixes: 0,
            fixed_location: false,
            gps_lat: 0.0,
            gps_lon: 0.0,
            gps_accuracy: 0.0,
            activity_phase: None,
            idle_seconds: 0.0,
            alerts_dispatched: 0,
        }
    }

    pub fn with_session(mut self, snapshot: &SessionSnapshot) -> Self {
        self.session_id = snapshot.session_id.map(|id| id.to_string());
        self.route_name = snapshot.route_name.clone();
        self.session_state = snapshot.state;
        self.elapsed_seconds = snapshot.elapsed_seconds;
        self.distance_meters = snapshot.total_distance_meters;
        self.current_speed = snapshot.current_speed;
        self.top_speed = snapshot.top_speed;
        self.elevation_meters = snapshot.current_elevation_meters;
        self.position_fixes = snapshot.sample_count;
        self.fixed_location = matches!(snapshot.location_mode, LocationMode::Fixed { .. });
        self
    }

    pub fn with_position(mut self, position: Option<PositionSample>) -> Self {
        if let Some(fix) = position {
            self.gps_lat = fix.latitude;
            self.gps_lon = fix.longitude;
            self.gps_accuracy = fix.horizontal_accuracy;
        }
        self
    }

    pub fn with_inactivity(
        mut self,
        state: Option<InactivityState>,
        phase: Option<ActivityPhase>,
        alerts_dispatched: u64,
    ) -> Self {
        if let Some(state) = state {
            self.idle_seconds = (self.timestamp - state.last_activity_timestamp).max(0.0);
        }
        self.activity_phase = phase;
        self.alerts_dispatched = alerts_dispatched;
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}
