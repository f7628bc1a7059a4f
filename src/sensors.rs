use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};

use crate::distance::haversine_meters;
use crate::error::SensorError;
use crate::samples::{MotionSample, PositionSample};
use crate::timer::current_timestamp;

pub type PositionCallback = Arc<dyn Fn(PositionSample) + Send + Sync>;
pub type MotionCallback = Arc<dyn Fn(MotionSample) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Stream of location fixes
pub trait PositionSource: Send + Sync {
    fn subscribe(&self, on_sample: PositionCallback) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
    fn start(&self) -> Result<(), SensorError>;
    fn stop(&self);
    /// Switch to a synthetic single-point stream
    fn set_fixed_location(&self, latitude: f64, longitude: f64);
    fn clear_fixed_location(&self);
    fn last_known(&self) -> Option<PositionSample>;
}

/// Stream of motion magnitudes, roughly 1 Hz
pub trait MotionSource: Send + Sync {
    fn subscribe(&self, on_sample: MotionCallback) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn Fn(T) + Send + Sync>)>,
}

impl<T> Subscribers<T> {
    fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    fn add(&mut self, callback: Arc<dyn Fn(T) + Send + Sync>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, callback));
        id
    }

    fn remove(&mut self, id: SubscriptionId) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    fn snapshot(&self) -> Vec<Arc<dyn Fn(T) + Send + Sync>> {
        self.entries.iter().map(|(_, cb)| cb.clone()).collect()
    }
}

struct PositionHubInner {
    subscribers: Subscribers<PositionSample>,
    available: bool,
    running: bool,
    fixed: Option<(f64, f64)>,
    last_known: Option<PositionSample>,
}

/// Push-based `PositionSource`. Platform glue (or a simulation loop) calls
/// `publish` from whatever thread the OS delivers fixes on.
pub struct PositionHub {
    inner: Mutex<PositionHubInner>,
}

impl PositionHub {
    pub fn new() -> Self {
        PositionHub {
            inner: Mutex::new(PositionHubInner {
                subscribers: Subscribers::new(),
                available: true,
                running: false,
                fixed: None,
                last_known: None,
            }),
        }
    }

    /// Record whether the location permission/hardware is present
    pub fn set_available(&self, available: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.available = available;
            if !available {
                inner.running = false;
            }
        }
    }

    /// Deliver a live fix to subscribers. Returns false when the hub is
    /// stopped or in fixed-location mode and the fix was dropped.
    pub fn publish(&self, sample: PositionSample) -> bool {
        let callbacks = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(_) => return false,
            };
            if !inner.running || inner.fixed.is_some() {
                return false;
            }
            inner.last_known = Some(sample);
            inner.subscribers.snapshot()
        };

        // Callbacks run outside the lock so they may call back into the hub
        for callback in callbacks {
            callback(sample);
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().map(|inner| inner.running).unwrap_or(false)
    }

    pub fn fixed_location(&self) -> Option<(f64, f64)> {
        self.inner.lock().ok().and_then(|inner| inner.fixed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.entries.len())
            .unwrap_or(0)
    }
}

impl Default for PositionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSource for PositionHub {
    fn subscribe(&self, on_sample: PositionCallback) -> SubscriptionId {
        match self.inner.lock() {
            Ok(mut inner) => inner.subscribers.add(on_sample),
            Err(poisoned) => poisoned.into_inner().subscribers.add(on_sample),
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.inner.lock() {
            Ok(mut inner) => inner.subscribers.remove(id),
            Err(poisoned) => poisoned.into_inner().subscribers.remove(id),
        }
    }

    fn start(&self) -> Result<(), SensorError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| SensorError::Unavailable("position hub lock poisoned".to_string()))?;
        if !inner.available {
            return Err(SensorError::Unavailable(
                "location permission or hardware missing".to_string(),
            ));
        }
        inner.running = true;
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.running = false;
        }
    }

    fn set_fixed_location(&self, latitude: f64, longitude: f64) {
        let (sample, callbacks) = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(_) => return,
            };
            // Reuse the last fix time so the synthetic point never looks
            // newer than live fixes that follow it
            let timestamp = inner
                .last_known
                .map(|s| s.timestamp)
                .unwrap_or_else(current_timestamp);
            let sample = PositionSample::fixed(timestamp, latitude, longitude);
            inner.fixed = Some((latitude, longitude));
            inner.last_known = Some(sample);
            let callbacks = if inner.running {
                inner.subscribers.snapshot()
            } else {
                Vec::new()
            };
            (sample, callbacks)
        };

        log::info!("[positions] fixed location set to {:.6},{:.6}", latitude, longitude);
        for callback in callbacks {
            callback(sample);
        }
    }

    fn clear_fixed_location(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.fixed.take().is_some() {
                log::info!("[positions] fixed location cleared, resuming live fixes");
            }
        }
    }

    fn last_known(&self) -> Option<PositionSample> {
        self.inner.lock().ok().and_then(|inner| inner.last_known)
    }
}

/// Push-based `MotionSource`
pub struct MotionHub {
    subscribers: Mutex<Subscribers<MotionSample>>,
}

impl MotionHub {
    pub fn new() -> Self {
        MotionHub {
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    pub fn publish(&self, sample: MotionSample) {
        let callbacks = match self.subscribers.lock() {
            Ok(subscribers) => subscribers.snapshot(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(sample);
        }
    }

    /// Publish raw accelerometer axes
    pub fn publish_axes(&self, timestamp: f64, ax: f64, ay: f64, az: f64) {
        self.publish(MotionSample::from_axes(timestamp, ax, ay, az));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subscribers| subscribers.entries.len())
            .unwrap_or(0)
    }
}

impl Default for MotionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionSource for MotionHub {
    fn subscribe(&self, on_sample: MotionCallback) -> SubscriptionId {
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.add(on_sample),
            Err(poisoned) => poisoned.into_inner().add(on_sample),
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        }
    }
}

/// A point on a simulated route
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Walk `waypoints` publishing one fix per `period`. Speed is derived from
/// the step length. Returns after the last waypoint.
pub async fn simulate_positions(hub: Arc<PositionHub>, waypoints: Vec<Waypoint>, period: Duration) {
    let mut interval = interval(period);
    let period_secs = period.as_secs_f64().max(f64::EPSILON);
    let mut previous: Option<Waypoint> = None;
    let mut sample_count = 0u64;

    for point in waypoints {
        interval.tick().await;

        let speed = previous
            .map(|p| haversine_meters(p.latitude, p.longitude, point.latitude, point.longitude) / period_secs)
            .unwrap_or(0.0);
        let seq = sample_count as f64;
        let sample = PositionSample::new(
            current_timestamp(),
            point.latitude,
            point.longitude,
            point.altitude,
            speed,
            5.0 + (seq * 0.1).sin() * 2.0,
        );

        if hub.publish(sample) {
            sample_count += 1;
            if sample_count % 10 == 0 {
                log::debug!("[positions] {} simulated fixes", sample_count);
            }
        }
        previous = Some(point);
    }

    log::info!("[positions] simulated route finished after {} fixes", sample_count);
}

/// Publish jittered motion for `active_samples` ticks, then near-still
/// readings until the task is dropped.
pub async fn simulate_motion(hub: Arc<MotionHub>, period: Duration, active_samples: u64) {
    use std::f64::consts::PI;

    let mut interval = interval(period);
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let t = sample_count as f64 * period.as_secs_f64();
        let (ax, ay, az) = if sample_count < active_samples {
            (
                (t * 2.0 * PI).sin() * 0.5,
                (t * 2.0 * PI).cos() * 0.3,
                (t * PI).sin() * 0.1,
            )
        } else {
            (0.004, 0.003, 0.002)
        };

        hub.publish_axes(current_timestamp(), ax, ay, az);
        sample_count += 1;
        if sample_count == active_samples {
            log::info!("[motion] simulated activity stopped after {} samples", sample_count);
        }
    }
}
