use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::error::TimerError;

/// Wall-clock seconds since the Unix epoch, the time base sensor samples use
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Convert a configured period in seconds, rejecting zero, negative and
/// non-finite values instead of panicking
pub fn period_from_secs(secs: f64) -> Result<Duration, TimerError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(TimerError::InvalidPeriod(secs)),
    }
}

/// Periodic callback on its own tokio task. The first tick fires one full
/// period after spawning. Dropping the ticker cancels it.
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawn on the current runtime
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Result<Self, TimerError>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(TimerError::InvalidPeriod(0.0));
        }
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let handle = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        });
        Ok(Self { handle })
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
