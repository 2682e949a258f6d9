//! Fixed interval callback driver.
//!
//! A [`SyncScheduler`] fires on multiples of its interval measured on a
//! [`Clock`] from the moment it started, running the callback to completion
//! each time. A callback that overruns one or more ticks resumes at the next
//! aligned tick. Ticks never overlap, and once the
//! handle is cancelled and joined no further callback side effects can
//! happen. Cancellation is observed between ticks only; a callback that has
//! started always runs to the end.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;

#[derive(Error, Debug)]
pub enum ScheduleError<E> {
    #[error("scheduled callback failed")]
    Callback(#[source] E),

    #[error("scheduler task failed")]
    Join(#[source] JoinError),
}

pub struct SyncScheduler;

impl SyncScheduler {
    /// Starts ticking every `interval`. The first callback runs one full
    /// interval after this call. `interval` must not be zero.
    pub fn start<E, F, Fut>(
        clock: Arc<dyn Clock>,
        interval: Duration,
        mut callback: F,
    ) -> TickerHandle<E>
    where
        E: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let start = clock.now();
            let mut next_tick = interval;
            let mut ticks: u64 = 0;
            loop {
                let wait = next_tick.saturating_sub(elapsed_since(clock.as_ref(), start));
                // `biased` so a cancel that raced with the timer wins.
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(()),
                    _ = clock.sleep(wait) => {}
                }
                if token.is_cancelled() {
                    return Ok(());
                }
                ticks += 1;
                debug!(ticks, "scheduler tick");
                if let Err(err) = callback().await {
                    return Err(ScheduleError::Callback(err));
                }

                // Ticks a slow callback ran over are dropped, not replayed.
                let elapsed = elapsed_since(clock.as_ref(), start);
                next_tick += interval;
                while !interval.is_zero() && next_tick <= elapsed {
                    next_tick += interval;
                }
            }
        });
        TickerHandle {
            cancel,
            task: Some(task),
        }
    }
}

fn elapsed_since(clock: &dyn Clock, start: DateTime<Utc>) -> Duration {
    (clock.now() - start).to_std().unwrap_or(Duration::ZERO)
}

/// Owner side of a running [`SyncScheduler`].
pub struct TickerHandle<E> {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), ScheduleError<E>>>>,
}

impl<E> TickerHandle<E> {
    /// Requests the scheduler to stop before its next tick.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves with the error that aborted the schedule. Stays pending if
    /// the scheduler stops cleanly. Cancel safe, so it can sit in a
    /// `select!` next to other completion sources.
    pub async fn failed(&mut self) -> ScheduleError<E> {
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            match result {
                Ok(Err(err)) => return err,
                Ok(Ok(())) => {}
                Err(err) => return ScheduleError::Join(err),
            }
        }
        std::future::pending().await
    }

    /// Waits for the scheduler task to end, including any in-flight callback.
    /// An error already returned by [`TickerHandle::failed`] is not repeated.
    pub async fn join(mut self) -> Result<(), ScheduleError<E>> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(err) => Err(ScheduleError::Join(err)),
            },
            None => Ok(()),
        }
    }

    pub async fn shutdown(self) -> Result<(), ScheduleError<E>> {
        self.cancel();
        self.join().await
    }
}
