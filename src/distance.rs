use geo::{HaversineDistance, Point};

use crate::samples::PositionSample;

/// Great-circle distance in meters between two WGS84 coordinates
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let from = Point::new(lon1, lat1);
    let to = Point::new(lon2, lat2);
    from.haversine_distance(&to)
}

/// Cumulative ground distance over accepted position fixes.
///
/// No deadband is applied: every accepted fix contributes its full
/// geodesic step, so accuracy filtering must happen upstream.
#[derive(Debug, Clone, Default)]
pub struct DistanceAccumulator {
    last_accepted: Option<PositionSample>,
    total_meters: f64,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fix. Returns the step in meters, or `None` for the first fix
    /// and for fixes rejected as stale or duplicate.
    pub fn accept(&mut self, sample: PositionSample) -> Option<f64> {
        if !self.is_newer(&sample) {
            return None;
        }

        let previous = self.last_accepted.replace(sample)?;
        let delta = haversine_meters(
            previous.latitude,
            previous.longitude,
            sample.latitude,
            sample.longitude,
        );
        self.total_meters += delta;
        Some(delta)
    }

    /// Whether `sample` is strictly newer than the last accepted fix
    pub fn is_newer(&self, sample: &PositionSample) -> bool {
        match &self.last_accepted {
            Some(last) => sample.timestamp > last.timestamp,
            None => true,
        }
    }

    /// Clear the anchor and zero the total (session start)
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.total_meters = 0.0;
    }

    /// Forget the anchor but keep the total, so the next fix starts a new
    /// segment without counting the jump to it.
    pub fn reanchor(&mut self) {
        self.last_accepted = None;
    }

    pub fn total(&self) -> f64 {
        self.total_meters
    }

    pub fn last_accepted(&self) -> Option<&PositionSample> {
        self.last_accepted.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn fix(timestamp: f64, latitude: f64, longitude: f64) -> PositionSample {
        PositionSample::new(timestamp, latitude, longitude, 1500.0, 2.0, 5.0)
    }

    fn track() -> Vec<PositionSample> {
        vec![
            fix(1.0, 46.5000, 7.9000),
            fix(2.0, 46.5004, 7.9003),
            fix(3.0, 46.5010, 7.9011),
            fix(4.0, 46.5013, 7.9020),
            fix(5.0, 46.5021, 7.9024),
        ]
    }

    #[test]
    fn test_first_sample_has_no_delta() {
        let mut acc = DistanceAccumulator::new();
        assert_eq!(acc.accept(fix(1.0, 46.5, 7.9)), None);
        assert_eq!(acc.total(), 0.0);
    }

    #[test]
    fn test_equator_kilometer() {
        let mut acc = DistanceAccumulator::new();
        acc.accept(fix(0.0, 0.0, 0.0));
        let delta = acc.accept(fix(1.0, 0.0, 0.008993216)).unwrap();

        assert_abs_diff_eq!(delta, 1000.0, epsilon = 5.0);
        assert_abs_diff_eq!(acc.total(), 1000.0, epsilon = 5.0);
    }

    #[test]
    fn test_total_is_sum_of_pairwise_steps() {
        let samples = track();
        let expected: f64 = samples
            .windows(2)
            .map(|w| haversine_meters(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
            .sum();

        let mut acc = DistanceAccumulator::new();
        let mut previous_total = 0.0;
        for sample in &samples {
            acc.accept(*sample);
            assert!(acc.total() >= previous_total);
            previous_total = acc.total();
        }
        assert_abs_diff_eq!(acc.total(), expected, epsilon = 1e-9);

        // Same input from a fresh reset gives the same total
        let first_total = acc.total();
        acc.reset();
        for sample in &samples {
            acc.accept(*sample);
        }
        assert_eq!(acc.total(), first_total);
    }

    #[test]
    fn test_stale_and_duplicate_timestamps_rejected() {
        let mut acc = DistanceAccumulator::new();
        acc.accept(fix(10.0, 46.5, 7.9));
        acc.accept(fix(11.0, 46.501, 7.9));
        let total = acc.total();

        assert_eq!(acc.accept(fix(11.0, 46.6, 7.9)), None);
        assert_eq!(acc.accept(fix(9.0, 46.7, 7.9)), None);
        assert_eq!(acc.total(), total);
        assert_eq!(acc.last_accepted().unwrap().timestamp, 11.0);
    }

    #[test]
    fn test_reanchor_keeps_total() {
        let mut acc = DistanceAccumulator::new();
        acc.accept(fix(1.0, 0.0, 0.0));
        acc.accept(fix(2.0, 0.0, 0.008993216));
        let total = acc.total();

        acc.reanchor();
        assert_eq!(acc.accept(fix(3.0, 10.0, 10.0)), None);
        assert_eq!(acc.total(), total);
    }

    #[test]
    fn test_stationary_noise_still_counts() {
        let mut acc = DistanceAccumulator::new();
        acc.accept(fix(1.0, 46.5, 7.9));
        acc.accept(fix(2.0, 46.50001, 7.9));
        assert!(acc.total() > 0.0);
    }
}
