//! Time source used for the periodic reports and completion timestamps.
//!
//! Production code runs on [`SystemClock`]. Tests use [`ManualClock`], which
//! only moves when told to and lets them wait until the scheduler is parked
//! on a sleep before advancing it.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::sync::watch;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock that only advances when a test asks it to.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
    registered: Arc<watch::Sender<u64>>,
}

struct ManualState {
    start: DateTime<Utc>,
    elapsed: Duration,
    sleepers: Vec<Sleeper>,
}

struct Sleeper {
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (registered, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(ManualState {
                start,
                elapsed: Duration::ZERO,
                sleepers: Vec::new(),
            })),
            registered: Arc::new(registered),
        }
    }

    /// Moves time forward and wakes every sleeper whose deadline passed.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.elapsed += by;
        let now = state.elapsed;
        let (due, pending): (Vec<_>, Vec<_>) = state
            .sleepers
            .drain(..)
            .partition(|sleeper| sleeper.deadline <= now);
        state.sleepers = pending;
        drop(state);
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Advances exactly to the earliest pending deadline and returns how far
    /// time moved, or `None` when nobody is sleeping.
    pub fn advance_next(&self) -> Option<Duration> {
        let step = {
            let mut state = self.lock();
            state.sleepers.retain(|sleeper| !sleeper.wake.is_closed());
            let next = state.sleepers.iter().map(|s| s.deadline).min()?;
            next.saturating_sub(state.elapsed)
        };
        self.advance(step);
        Some(step)
    }

    /// Number of live sleepers, ignoring ones whose future was dropped.
    pub fn sleepers(&self) -> usize {
        self.lock()
            .sleepers
            .iter()
            .filter(|sleeper| !sleeper.wake.is_closed())
            .count()
    }

    /// Resolves once at least `count` sleepers are parked on this clock.
    pub async fn wait_for_sleepers(&self, count: usize) {
        let mut registered = self.registered.subscribe();
        loop {
            if self.sleepers() >= count {
                return;
            }
            if registered.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualClock")
            .field("start", &state.start)
            .field("elapsed", &state.elapsed)
            .field("sleepers", &state.sleepers.len())
            .finish()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let state = self.lock();
        let elapsed = TimeDelta::from_std(state.elapsed).unwrap_or(TimeDelta::MAX);
        state.start + elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let rx = {
            let mut state = self.lock();
            if duration.is_zero() {
                return;
            }
            let (wake, rx) = oneshot::channel();
            let deadline = state.elapsed + duration;
            state.sleepers.push(Sleeper { deadline, wake });
            rx
        };
        self.registered.send_modify(|count| *count += 1);
        let _ = rx.await;
    }
}
