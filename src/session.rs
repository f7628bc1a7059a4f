use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::Duration;

use crate::api::{RouteResolver, RunSubmitter, SubmissionPayload};
use crate::config::TrackerConfig;
use crate::credentials::CredentialStore;
use crate::distance::DistanceAccumulator;
use crate::error::{ResolutionError, SessionError, SessionResult};
use crate::samples::PositionSample;
use crate::sensors::{PositionSource, SubscriptionId};
use crate::speed::{LocationMode, SpeedElevationTracker};
use crate::timer::{current_timestamp, Ticker};

/// One elapsed-clock tick is one second of session time
const CLOCK_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started
    Idle,
    /// Recording: clock running, fixes accumulating
    Active,
    /// Metrics frozen, waiting for save or discard
    Ended,
    /// Submitted to the backend, kept for audit
    Saved,
    /// Dropped without submission
    Discarded,
}

/// Metrics of one session. Frozen once the session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    /// Highest clamped speed seen during the session, m/s
    pub top_speed: f64,
    pub total_distance_meters: f64,
    pub current_elevation_meters: f64,
    pub sample_count: u64,
}

impl SessionMetrics {
    fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            elapsed_seconds: 0,
            top_speed: 0.0,
            total_distance_meters: 0.0,
            current_elevation_meters: 0.0,
            sample_count: 0,
        }
    }
}

/// One recorded activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSession {
    pub id: SessionId,
    pub route_name: String,
    pub state: SessionState,
    pub metrics: SessionMetrics,
}

/// Point-in-time view for UI consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub route_name: Option<String>,
    pub state: SessionState,
    pub elapsed_seconds: u64,
    pub total_distance_meters: f64,
    pub current_speed: f64,
    pub current_elevation_meters: f64,
    pub top_speed: f64,
    pub sample_count: u64,
    pub location_mode: LocationMode,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            session_id: None,
            route_name: None,
            state: SessionState::Idle,
            elapsed_seconds: 0,
            total_distance_meters: 0.0,
            current_speed: 0.0,
            current_elevation_meters: 0.0,
            top_speed: 0.0,
            sample_count: 0,
            location_mode: LocationMode::Live,
        }
    }
}

/// All mutable tracking state, behind one lock
struct Engine {
    current: Option<RouteSession>,
    distance: DistanceAccumulator,
    tracker: SpeedElevationTracker,
    saving: bool,
    saved: Vec<RouteSession>,
    next_id: u64,
}

impl Engine {
    fn new() -> Self {
        Self {
            current: None,
            distance: DistanceAccumulator::new(),
            tracker: SpeedElevationTracker::new(),
            saving: false,
            saved: Vec::new(),
            next_id: 0,
        }
    }

    fn state(&self) -> SessionState {
        self.current
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    fn active_session_mut(&mut self, id: SessionId) -> Option<&mut RouteSession> {
        self.current
            .as_mut()
            .filter(|s| s.id == id && s.state == SessionState::Active)
    }

    fn record_position(&mut self, id: SessionId, sample: PositionSample) -> Option<SessionSnapshot> {
        let Engine {
            current,
            distance,
            tracker,
            ..
        } = self;
        let session = current
            .as_mut()
            .filter(|s| s.id == id && s.state == SessionState::Active)?;

        if !distance.is_newer(&sample) {
            log::debug!("[session] dropping stale fix at {:.3}", sample.timestamp);
            return None;
        }

        distance.accept(sample);
        tracker.update(sample);

        let metrics = &mut session.metrics;
        metrics.sample_count += 1;
        metrics.total_distance_meters = distance.total();
        metrics.top_speed = metrics.top_speed.max(tracker.current_speed());
        metrics.current_elevation_meters = tracker.current_elevation();

        Some(self.snapshot())
    }

    fn tick(&mut self, id: SessionId) -> Option<SessionSnapshot> {
        let session = self.active_session_mut(id)?;
        session.metrics.elapsed_seconds += 1;
        Some(self.snapshot())
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::idle();
        snapshot.location_mode = self.tracker.mode();
        if let Some(session) = &self.current {
            snapshot.session_id = Some(session.id);
            snapshot.route_name = Some(session.route_name.clone());
            snapshot.state = session.state;
            snapshot.elapsed_seconds = session.metrics.elapsed_seconds;
            snapshot.total_distance_meters = session.metrics.total_distance_meters;
            snapshot.current_elevation_meters = session.metrics.current_elevation_meters;
            snapshot.top_speed = session.metrics.top_speed;
            snapshot.sample_count = session.metrics.sample_count;
            if session.state == SessionState::Active {
                snapshot.current_speed = self.tracker.current_speed();
            }
        }
        snapshot
    }
}

/// Marks a save as in flight. Dropping an armed claim (the save future was
/// cancelled mid-request) clears the mark so the save can be retried.
struct SaveClaim {
    engine: Arc<Mutex<Engine>>,
    armed: bool,
}

impl SaveClaim {
    fn release(mut self, engine: &mut Engine) {
        engine.saving = false;
        self.armed = false;
    }
}

impl Drop for SaveClaim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut engine = match self.engine.lock() {
            Ok(engine) => engine,
            Err(poisoned) => poisoned.into_inner(),
        };
        engine.saving = false;
        log::info!("[session] save abandoned before completion");
    }
}

/// Subscription and timer owned by the active session
#[derive(Default)]
struct SessionHandles {
    subscription: Option<SubscriptionId>,
    clock: Option<Ticker>,
}

/// Drives the session lifecycle: start, end, then save or discard.
///
/// Only one session can be `Active` at a time. Position fixes and clock
/// ticks arrive on other threads and are serialized through one lock, so
/// snapshots never see a half-applied update.
pub struct SessionController<S, R> {
    config: TrackerConfig,
    engine: Arc<Mutex<Engine>>,
    handles: Mutex<SessionHandles>,
    positions: Arc<dyn PositionSource>,
    submitter: Arc<S>,
    resolver: Arc<R>,
    credentials: Arc<dyn CredentialStore>,
    updates: Arc<watch::Sender<SessionSnapshot>>,
}

impl<S, R> SessionController<S, R>
where
    S: RunSubmitter,
    R: RouteResolver,
{
    pub fn new(
        config: TrackerConfig,
        positions: Arc<dyn PositionSource>,
        submitter: Arc<S>,
        resolver: Arc<R>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::idle());
        Self {
            config,
            engine: Arc::new(Mutex::new(Engine::new())),
            handles: Mutex::new(SessionHandles::default()),
            positions,
            submitter,
            resolver,
            credentials,
            updates: Arc::new(updates),
        }
    }

    fn lock_engine(&self) -> SessionResult<MutexGuard<'_, Engine>> {
        self.engine
            .lock()
            .map_err(|_| SessionError::Internal("Failed to acquire engine lock".to_string()))
    }

    fn lock_handles(&self) -> SessionResult<MutexGuard<'_, SessionHandles>> {
        self.handles
            .lock()
            .map_err(|_| SessionError::Internal("Failed to acquire session handle lock".to_string()))
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.updates.send_replace(snapshot);
    }

    /// Start a new session (Idle/Ended/Saved/Discarded → Active).
    ///
    /// Must run inside a tokio runtime, which drives the elapsed-time clock.
    /// An ended but unsaved session is discarded.
    pub fn start(&self, route_name: impl Into<String>) -> SessionResult<SessionId> {
        let route_name = route_name.into();
        let mut handles = self.lock_handles()?;

        let (id, snapshot) = {
            let mut engine = self.lock_engine()?;
            match engine.state() {
                SessionState::Active => return Err(SessionError::AlreadyActive),
                SessionState::Ended if engine.saving => return Err(SessionError::SaveInProgress),
                SessionState::Ended => {
                    if let Some(pending) = &engine.current {
                        log::warn!("[session] discarding unsaved {} to start a new one", pending.id);
                    }
                }
                _ => {}
            }

            let id = SessionId(engine.next_id + 1);
            let clock_engine = self.engine.clone();
            let clock_updates = self.updates.clone();
            let clock = Ticker::spawn(CLOCK_TICK, move || {
                let snapshot = match clock_engine.lock() {
                    Ok(mut engine) => engine.tick(id),
                    Err(_) => None,
                };
                if let Some(snapshot) = snapshot {
                    clock_updates.send_replace(snapshot);
                }
            })?;

            engine.next_id += 1;
            engine.distance.reset();
            engine.current = Some(RouteSession {
                id,
                route_name: route_name.clone(),
                state: SessionState::Active,
                metrics: SessionMetrics::started(Utc::now()),
            });
            handles.clock = Some(clock);
            (id, engine.snapshot())
        };

        let max_accuracy = self.config.positions.max_horizontal_accuracy_m;
        let sample_engine = self.engine.clone();
        let sample_updates = self.updates.clone();
        let subscription = self.positions.subscribe(Arc::new(move |sample: PositionSample| {
            if !sample.is_usable(max_accuracy) {
                log::debug!(
                    "[session] dropping invalid fix ({:.5},{:.5} ±{:.1}m)",
                    sample.latitude,
                    sample.longitude,
                    sample.horizontal_accuracy
                );
                return;
            }
            let snapshot = match sample_engine.lock() {
                Ok(mut engine) => engine.record_position(id, sample),
                Err(_) => None,
            };
            if let Some(snapshot) = snapshot {
                sample_updates.send_replace(snapshot);
            }
        }));
        handles.subscription = Some(subscription);

        if let Err(e) = self.positions.start() {
            log::warn!("[session] {}; distance and speed will stay at zero", e);
        }

        self.publish(snapshot);
        log::info!("[session] {} started on route '{}'", id, route_name);
        Ok(id)
    }

    /// End the active session (Active → Ended) and return its frozen metrics.
    /// No fix or tick can change them after this returns.
    pub fn end(&self) -> SessionResult<SessionMetrics> {
        let mut handles = self.lock_handles()?;

        let (metrics, id, snapshot) = {
            let mut engine = self.lock_engine()?;
            let session = engine
                .current
                .as_mut()
                .filter(|s| s.state == SessionState::Active)
                .ok_or(SessionError::NotActive)?;
            session.state = SessionState::Ended;
            session.metrics.end_time = Some(Utc::now());
            let metrics = session.metrics.clone();
            let id = session.id;
            (metrics, id, engine.snapshot())
        };

        if let Some(clock) = handles.clock.take() {
            clock.cancel();
        }
        if let Some(subscription) = handles.subscription.take() {
            self.positions.unsubscribe(subscription);
        }

        self.publish(snapshot);
        log::info!(
            "[session] {} ended: {:.1} m in {} s, top speed {:.1} m/s, {} fixes",
            id,
            metrics.total_distance_meters,
            metrics.elapsed_seconds,
            metrics.top_speed,
            metrics.sample_count
        );
        Ok(metrics)
    }

    /// Submit the ended session (Ended → Saved). On any failure the session
    /// stays `Ended` with its metrics intact so the call can be retried.
    pub async fn save(&self) -> SessionResult<()> {
        let (id, route_name, metrics, claim) = {
            let mut engine = self.lock_engine()?;
            let session = engine
                .current
                .as_ref()
                .filter(|s| s.state == SessionState::Ended)
                .ok_or(SessionError::NotEnded)?;
            let frozen = (session.id, session.route_name.clone(), session.metrics.clone());
            if engine.saving {
                return Err(SessionError::SaveInProgress);
            }
            engine.saving = true;
            let claim = SaveClaim {
                engine: self.engine.clone(),
                armed: true,
            };
            (frozen.0, frozen.1, frozen.2, claim)
        };

        let result = self.submit_frozen(&route_name, &metrics).await;

        let snapshot = {
            let mut engine = self.lock_engine()?;
            claim.release(&mut engine);
            if let Err(e) = result {
                log::warn!("[session] saving {} failed: {}", id, e);
                return Err(e);
            }

            let saved = match engine.current.as_mut().filter(|s| s.id == id) {
                Some(session) => {
                    session.state = SessionState::Saved;
                    session.clone()
                }
                None => return Err(SessionError::Internal("session replaced during save".to_string())),
            };
            engine.saved.push(saved);
            engine.snapshot()
        };

        self.publish(snapshot);
        log::info!("[session] {} saved", id);
        Ok(())
    }

    async fn submit_frozen(&self, route_name: &str, metrics: &SessionMetrics) -> SessionResult<()> {
        let mountain_id = self
            .credentials
            .selected_mountain()
            .ok_or(ResolutionError::NoMountainSelected)?;
        let run_id = self.resolver.resolve(&mountain_id, route_name).await?;
        let payload = SubmissionPayload::from_metrics(metrics, run_id, mountain_id);
        self.submitter.submit(&payload).await?;
        Ok(())
    }

    /// Drop the ended session without submitting it (Ended → Discarded)
    pub fn discard(&self) -> SessionResult<()> {
        let snapshot = {
            let mut engine = self.lock_engine()?;
            if engine.saving {
                return Err(SessionError::SaveInProgress);
            }
            let session = engine
                .current
                .as_mut()
                .filter(|s| s.state == SessionState::Ended)
                .ok_or(SessionError::NotEnded)?;
            session.state = SessionState::Discarded;
            session.metrics = SessionMetrics::started(session.metrics.start_time);
            log::info!("[session] {} discarded", session.id);
            engine.snapshot()
        };
        self.publish(snapshot);
        Ok(())
    }

    /// Switch to simulated location mode. The accumulated distance is kept
    /// but the jump to the fixed point is not counted.
    pub fn set_fixed_location(&self, latitude: f64, longitude: f64) -> SessionResult<()> {
        {
            let mut engine = self.lock_engine()?;
            engine.tracker.set_fixed_location(latitude, longitude, current_timestamp());
            engine.distance.reanchor();
        }
        // The source may deliver the synthetic fix synchronously
        self.positions.set_fixed_location(latitude, longitude);
        self.publish(self.snapshot()?);
        Ok(())
    }

    pub fn clear_fixed_location(&self) -> SessionResult<()> {
        {
            let mut engine = self.lock_engine()?;
            engine.tracker.clear_fixed_location();
            engine.distance.reanchor();
        }
        self.positions.clear_fixed_location();
        self.publish(self.snapshot()?);
        Ok(())
    }

    pub fn state(&self) -> SessionResult<SessionState> {
        Ok(self.lock_engine()?.state())
    }

    pub fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        Ok(self.lock_engine()?.snapshot())
    }

    /// Change notifications; every accepted fix, tick and transition
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub fn current_session(&self) -> SessionResult<Option<RouteSession>> {
        Ok(self.lock_engine()?.current.clone())
    }

    /// Sessions submitted so far, oldest first
    pub fn saved_sessions(&self) -> SessionResult<Vec<RouteSession>> {
        Ok(self.lock_engine()?.saved.clone())
    }
}

impl<S, R> SessionController<S, R> {
    /// Cancel the clock and drop the position subscription
    pub fn shutdown(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            if let Some(clock) = handles.clock.take() {
                clock.cancel();
            }
            if let Some(subscription) = handles.subscription.take() {
                self.positions.unsubscribe(subscription);
            }
        }
    }
}

impl<S, R> Drop for SessionController<S, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
