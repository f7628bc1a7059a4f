use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::{AlertPayload, AlertSink};
use crate::config::InactivityConfig;
use crate::error::TimerError;
use crate::samples::MotionSample;
use crate::sensors::{MotionSource, PositionSource, SubscriptionId};
use crate::timer::{current_timestamp, Ticker};

/// Seconds-valued time source for the periodic check. Must share a time
/// base with motion sample timestamps.
pub type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityPhase {
    /// Motion seen within the threshold window
    Idle,
    /// Threshold exceeded, alert already dispatched for this episode
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InactivityState {
    pub last_activity_timestamp: f64,
    pub alerted: bool,
}

/// Inactivity state machine with no timers or side effects
#[derive(Debug, Clone)]
pub struct InactivityDetector {
    threshold_secs: f64,
    motion_epsilon: f64,
    state: InactivityState,
    phase: ActivityPhase,
}

impl InactivityDetector {
    /// `started_at` counts as the last activity until motion is seen
    pub fn new(threshold_secs: f64, motion_epsilon: f64, started_at: f64) -> Self {
        Self {
            threshold_secs,
            motion_epsilon,
            state: InactivityState {
                last_activity_timestamp: started_at,
                alerted: false,
            },
            phase: ActivityPhase::Idle,
        }
    }

    pub fn from_config(config: &InactivityConfig, started_at: f64) -> Self {
        Self::new(config.threshold_secs, config.motion_epsilon, started_at)
    }

    /// Returns true when this sample ends an alerted inactivity episode
    pub fn on_motion(&mut self, sample: MotionSample) -> bool {
        if sample.magnitude <= self.motion_epsilon {
            return false;
        }

        self.state.last_activity_timestamp = self.state.last_activity_timestamp.max(sample.timestamp);
        if self.phase == ActivityPhase::Inactive {
            self.phase = ActivityPhase::Idle;
            self.state.alerted = false;
            return true;
        }
        false
    }

    /// Periodic check. Returns true exactly once per episode, when the alert
    /// should be dispatched.
    pub fn check(&mut self, now: f64) -> bool {
        let elapsed = now - self.state.last_activity_timestamp;
        if elapsed >= self.threshold_secs {
            if !self.state.alerted {
                self.state.alerted = true;
                self.phase = ActivityPhase::Inactive;
                return true;
            }
        } else {
            self.phase = ActivityPhase::Idle;
        }
        false
    }

    pub fn state(&self) -> InactivityState {
        self.state
    }

    pub fn phase(&self) -> ActivityPhase {
        self.phase
    }

    pub fn idle_secs(&self, now: f64) -> f64 {
        (now - self.state.last_activity_timestamp).max(0.0)
    }
}

struct MonitorShared {
    detector: Mutex<InactivityDetector>,
    positions: Arc<dyn PositionSource>,
    sink: Arc<dyn AlertSink>,
    clock: Clock,
    dispatched: AtomicU64,
}

impl MonitorShared {
    fn run_check(&self) {
        let now = (self.clock)();
        let fire = match self.detector.lock() {
            Ok(mut detector) => detector.check(now),
            Err(_) => {
                log::warn!("[inactivity] detector lock poisoned, skipping check");
                false
            }
        };

        if fire {
            log::info!("[inactivity] no motion for the threshold window, dispatching alert");
            self.dispatch();
        }
    }

    /// Needs a last known position; without one the alert is skipped
    fn dispatch(&self) -> bool {
        match self.positions.last_known() {
            Some(position) => {
                self.sink.dispatch(AlertPayload {
                    latitude: position.latitude,
                    longitude: position.longitude,
                });
                self.dispatched.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => {
                log::warn!("[inactivity] no known position, alert not sent");
                false
            }
        }
    }
}

/// Watches the motion stream for the lifetime of the app, independent of
/// any route session.
pub struct InactivityMonitor {
    shared: Arc<MonitorShared>,
    motion: Arc<dyn MotionSource>,
    subscription: Mutex<Option<SubscriptionId>>,
    ticker: Mutex<Option<Ticker>>,
}

impl InactivityMonitor {
    /// Subscribe to motion and start the periodic check, using wall-clock time
    pub fn start(
        config: &InactivityConfig,
        motion: Arc<dyn MotionSource>,
        positions: Arc<dyn PositionSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, TimerError> {
        Self::start_with_clock(config, motion, positions, sink, Arc::new(current_timestamp))
    }

    pub fn start_with_clock(
        config: &InactivityConfig,
        motion: Arc<dyn MotionSource>,
        positions: Arc<dyn PositionSource>,
        sink: Arc<dyn AlertSink>,
        clock: Clock,
    ) -> Result<Self, TimerError> {
        let shared = Arc::new(MonitorShared {
            detector: Mutex::new(InactivityDetector::from_config(config, clock())),
            positions,
            sink,
            clock,
            dispatched: AtomicU64::new(0),
        });

        let tick_shared = shared.clone();
        let ticker = Ticker::spawn(config.check_interval()?, move || tick_shared.run_check())?;

        let motion_shared = shared.clone();
        let subscription = motion.subscribe(Arc::new(move |sample: MotionSample| {
            if let Ok(mut detector) = motion_shared.detector.lock() {
                if detector.on_motion(sample) {
                    log::info!("[inactivity] motion resumed, alert cleared");
                }
            }
        }));

        log::info!(
            "[inactivity] monitoring started (threshold {:.0}s, check every {:.1}s)",
            config.threshold_secs,
            config.check_interval_secs
        );

        Ok(Self {
            shared,
            motion,
            subscription: Mutex::new(Some(subscription)),
            ticker: Mutex::new(Some(ticker)),
        })
    }

    /// Dispatch an alert now. Leaves the automatic state machine untouched.
    pub fn force_alert(&self) -> bool {
        log::info!("[inactivity] manual alert requested");
        self.shared.dispatch()
    }

    /// Run one check immediately, outside the timer
    pub fn check_now(&self) {
        self.shared.run_check();
    }

    pub fn state(&self) -> Option<InactivityState> {
        self.shared.detector.lock().ok().map(|d| d.state())
    }

    pub fn phase(&self) -> Option<ActivityPhase> {
        self.shared.detector.lock().ok().map(|d| d.phase())
    }

    /// Alerts handed to the sink so far, automatic and forced
    pub fn dispatched_count(&self) -> u64 {
        self.shared.dispatched.load(Ordering::SeqCst)
    }

    /// Full teardown: cancel the timer and drop the motion subscription
    pub fn stop(&self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(ticker) = ticker.take() {
                ticker.cancel();
                log::info!("[inactivity] monitoring stopped");
            }
        }
        if let Ok(mut subscription) = self.subscription.lock() {
            if let Some(id) = subscription.take() {
                self.motion.unsubscribe(id);
            }
        }
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::PositionSample;
    use crate::sensors::{MotionHub, PositionHub};
    use tokio::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<AlertPayload>>,
    }

    impl AlertSink for RecordingSink {
        fn dispatch(&self, alert: AlertPayload) {
            self.alerts.lock().unwrap().push(alert);
        }
    }

    fn config() -> InactivityConfig {
        InactivityConfig {
            threshold_secs: 300.0,
            motion_epsilon: 0.05,
            check_interval_secs: 5.0,
        }
    }

    #[test]
    fn test_single_fire_per_episode() {
        let mut detector = InactivityDetector::from_config(&config(), 0.0);
        let mut fired_at = Vec::new();

        for t in 0..=310 {
            let t = t as f64;
            detector.on_motion(MotionSample::new(t, 0.01));
            if t as u64 % 5 == 0 && detector.check(t) {
                fired_at.push(t);
            }
        }

        assert_eq!(fired_at, vec![300.0]);
        assert!(detector.state().alerted);
        assert_eq!(detector.phase(), ActivityPhase::Inactive);

        // Motion above the noise floor ends the episode
        assert!(detector.on_motion(MotionSample::new(311.0, 0.1)));
        assert!(!detector.state().alerted);
        assert_eq!(detector.phase(), ActivityPhase::Idle);
        assert_eq!(detector.state().last_activity_timestamp, 311.0);

        // A new episode can fire again
        assert!(!detector.check(400.0));
        assert!(detector.check(611.0));
    }

    #[test]
    fn test_motion_before_threshold_keeps_idle() {
        let mut detector = InactivityDetector::from_config(&config(), 0.0);
        detector.on_motion(MotionSample::new(200.0, 0.3));
        assert!(!detector.check(450.0));
        assert_eq!(detector.phase(), ActivityPhase::Idle);
        assert_eq!(detector.idle_secs(450.0), 250.0);
        assert!(detector.check(500.0));
    }

    #[test]
    fn test_epsilon_is_exclusive() {
        let mut detector = InactivityDetector::from_config(&config(), 0.0);
        detector.on_motion(MotionSample::new(100.0, 0.05));
        assert_eq!(detector.state().last_activity_timestamp, 0.0);
    }

    #[test]
    fn test_out_of_order_motion_never_rewinds() {
        let mut detector = InactivityDetector::from_config(&config(), 0.0);
        detector.on_motion(MotionSample::new(100.0, 1.0));
        detector.on_motion(MotionSample::new(50.0, 1.0));
        assert_eq!(detector.state().last_activity_timestamp, 100.0);
    }

    fn paused_clock() -> Clock {
        let origin = Instant::now();
        Arc::new(move || origin.elapsed().as_secs_f64())
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_dispatches_once_with_position() {
        let motion = Arc::new(MotionHub::new());
        let positions = Arc::new(PositionHub::new());
        positions.start().unwrap();
        positions.publish(PositionSample::new(1.0, 46.02, 7.75, 2900.0, 0.0, 4.0));
        let sink = Arc::new(RecordingSink::default());

        let clock = paused_clock();
        let monitor = InactivityMonitor::start_with_clock(
            &config(),
            motion.clone(),
            positions.clone(),
            sink.clone(),
            clock.clone(),
        )
        .unwrap();

        // Low-magnitude jitter every second
        let feeder_motion = motion.clone();
        let feeder_clock = clock.clone();
        let feeder = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                feeder_motion.publish(MotionSample::new(feeder_clock(), 0.01));
            }
        });

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(monitor.dispatched_count(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(monitor.dispatched_count(), 1);
        assert_eq!(monitor.phase(), Some(ActivityPhase::Inactive));
        assert_eq!(
            sink.alerts.lock().unwrap().as_slice(),
            &[AlertPayload { latitude: 46.02, longitude: 7.75 }]
        );

        feeder.abort();
        motion.publish(MotionSample::new(clock(), 0.1));
        let state = monitor.state().unwrap();
        assert!(!state.alerted);
        assert_eq!(monitor.phase(), Some(ActivityPhase::Idle));

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_check_interval_fails_start() {
        let motion = Arc::new(MotionHub::new());
        let positions = Arc::new(PositionHub::new());
        let sink = Arc::new(RecordingSink::default());

        for secs in [0.0, -5.0] {
            let config = InactivityConfig {
                check_interval_secs: secs,
                ..config()
            };
            let started = InactivityMonitor::start_with_clock(
                &config,
                motion.clone(),
                positions.clone(),
                sink.clone(),
                paused_clock(),
            );
            assert!(matches!(started, Err(TimerError::InvalidPeriod(_))));
        }
        assert_eq!(motion.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_skipped_without_position() {
        let motion = Arc::new(MotionHub::new());
        let positions = Arc::new(PositionHub::new());
        let sink = Arc::new(RecordingSink::default());
        let monitor = InactivityMonitor::start_with_clock(
            &config(),
            motion,
            positions,
            sink.clone(),
            paused_clock(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(320)).await;
        // Detector fired but nothing reached the sink
        assert_eq!(monitor.state().map(|s| s.alerted), Some(true));
        assert_eq!(monitor.dispatched_count(), 0);
        assert!(sink.alerts.lock().unwrap().is_empty());
        assert!(!monitor.force_alert());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_alert_leaves_state_alone() {
        let motion = Arc::new(MotionHub::new());
        let positions = Arc::new(PositionHub::new());
        positions.start().unwrap();
        positions.publish(PositionSample::new(1.0, 45.9, 6.87, 1035.0, 0.0, 4.0));
        let sink = Arc::new(RecordingSink::default());
        let monitor = InactivityMonitor::start_with_clock(
            &config(),
            motion,
            positions,
            sink.clone(),
            paused_clock(),
        )
        .unwrap();

        assert!(monitor.force_alert());
        assert!(monitor.force_alert());
        assert_eq!(sink.alerts.lock().unwrap().len(), 2);
        assert_eq!(monitor.state().map(|s| s.alerted), Some(false));
        assert_eq!(monitor.phase(), Some(ActivityPhase::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer_and_subscription() {
        let motion = Arc::new(MotionHub::new());
        let positions = Arc::new(PositionHub::new());
        positions.start().unwrap();
        positions.publish(PositionSample::new(1.0, 45.9, 6.87, 1035.0, 0.0, 4.0));
        let sink = Arc::new(RecordingSink::default());
        let monitor = InactivityMonitor::start_with_clock(
            &config(),
            motion.clone(),
            positions,
            sink.clone(),
            paused_clock(),
        )
        .unwrap();

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(monitor.dispatched_count(), 0);

        // Motion no longer reaches the detector
        motion.publish(MotionSample::new(390.0, 5.0));
        assert_eq!(monitor.state().map(|s| s.last_activity_timestamp), Some(0.0));
    }
}
