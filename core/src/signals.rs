//! Forwarding of signals received by this process to the supervised child.
//!
//! A [`SignalSubscription`] is scoped to a single run. In production it is
//! fed by OS signal handlers; tests feed it through a channel so several runs
//! in one process never see each other's signals.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;
use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

/// Signals caught while a command runs and passed on to it.
pub const RELAYED_SIGNALS: [Signal; 8] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGWINCH,
    Signal::SIGALRM,
];

const SIGNAL_QUEUE_CAPACITY: usize = 16;

#[derive(Error, Debug)]
#[error("failed to relay {signal} to process {pid}")]
pub struct RelayError {
    pub signal: Signal,
    pub pid: i32,
    #[source]
    pub source: Errno,
}

/// Delivers one signal to a process. [`kill`] unless replaced.
pub type SignalForwarder = Box<dyn Fn(Pid, Signal) -> nix::Result<()> + Send + Sync>;

/// Stream of signals destined for one supervised command.
pub struct SignalSubscription {
    rx: mpsc::Receiver<Signal>,
    listeners: Vec<JoinHandle<()>>,
    forward: SignalForwarder,
}

impl SignalSubscription {
    /// Installs handlers for [`RELAYED_SIGNALS`]. Must be called before the
    /// child is spawned so nothing sent in between is lost.
    pub fn os() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        let mut subscription = Self {
            rx,
            listeners: Vec::with_capacity(RELAYED_SIGNALS.len()),
            forward: Box::new(kill::<Signal>),
        };
        for signal in RELAYED_SIGNALS {
            let mut stream = tokio::signal::unix::signal(SignalKind::from_raw(signal as i32))?;
            let tx = tx.clone();
            subscription.listeners.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.send(signal).await.is_err() {
                        break;
                    }
                }
            }));
        }
        Ok(subscription)
    }

    /// Subscription fed by the returned sender instead of OS handlers.
    pub fn channel() -> (mpsc::Sender<Signal>, Self) {
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        (
            tx,
            Self {
                rx,
                listeners: Vec::new(),
                forward: Box::new(kill::<Signal>),
            },
        )
    }

    /// Replaces how received signals reach the process.
    pub fn with_forwarder<F>(mut self, forward: F) -> Self
    where
        F: Fn(Pid, Signal) -> nix::Result<()> + Send + Sync + 'static,
    {
        self.forward = Box::new(forward);
        self
    }

    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for SignalSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSubscription")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Background task forwarding a subscription's signals to one process.
pub struct SignalRelay {
    task: Option<JoinHandle<Result<(), RelayError>>>,
    shutdown: CancellationToken,
}

impl SignalRelay {
    pub fn spawn(mut subscription: SignalSubscription, pid: Pid, exited: Arc<AtomicBool>) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(()),
                    received = subscription.recv() => match received {
                        Some(signal) => signal,
                        None => return Ok(()),
                    },
                };
                if exited.load(Ordering::Acquire) {
                    debug!(%signal, "command already exited; stopping signal relay");
                    return Ok(());
                }
                match relay_outcome((subscription.forward)(pid, signal), signal, pid) {
                    Ok(true) => {}
                    Ok(false) => return Ok(()),
                    Err(err) => return Err(err),
                }
            }
        });
        Self {
            task: Some(task),
            shutdown,
        }
    }

    /// Resolves only if forwarding a signal failed. A relay that stops
    /// quietly keeps this pending forever. Cancel safe.
    pub async fn failed(&mut self) -> RelayError {
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            match result {
                Ok(Err(err)) => return err,
                Ok(Ok(())) => {}
                Err(err) => warn!("signal relay task ended abnormally: {err}"),
            }
        }
        std::future::pending().await
    }

    /// Stops the relay and releases its signal handlers.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("signal relay failed during shutdown: {err}"),
                Err(err) => warn!("signal relay task ended abnormally: {err}"),
            }
        }
    }
}

/// Interprets the result of forwarding one signal. `Ok(false)` means the
/// process is gone and the relay should stop.
fn relay_outcome(result: nix::Result<()>, signal: Signal, pid: Pid) -> Result<bool, RelayError> {
    match result {
        Ok(()) => {
            debug!(%signal, pid = pid.as_raw(), "relayed signal");
            Ok(true)
        }
        Err(Errno::ESRCH) => {
            debug!(%signal, pid = pid.as_raw(), "command already exited; stopping signal relay");
            Ok(false)
        }
        Err(source) => Err(RelayError {
            signal,
            pid: pid.as_raw(),
            source,
        }),
    }
}

impl std::fmt::Debug for SignalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRelay")
            .field("running", &self.task.is_some())
            .finish()
    }
}
