//! Top level protocol of one invocation.
//!
//! 1. Start the command. If that fails, report a completed, failed check run
//!    and stop.
//! 2. Create the check run as in progress.
//! 3. Relay signals and send periodic updates until the command exits or
//!    either background activity fails, whichever happens first.
//! 4. Cancel and join the periodic updates, then send the final report.
//!
//! Step 4 is what keeps a late periodic update from overwriting the final
//! state on GitHub: once the scheduler is joined nothing else can send.

use std::io;
use std::io::Write;
use std::process::ExitStatus;
use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::checks::CheckRunConclusion;
use crate::checks::ChecksService;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::context::RunContext;
use crate::error::CheckRunErr;
use crate::error::Result;
use crate::reporter::CheckRunReporter;
use crate::scheduler::ScheduleError;
use crate::scheduler::SyncScheduler;
use crate::signals::RelayError;
use crate::signals::SignalRelay;
use crate::signals::SignalSubscription;
use crate::supervisor::KILL_DRAIN_GRACE;
use crate::supervisor::OutputFanout;
use crate::supervisor::ProcessSupervisor;
use crate::terminal::TerminalBuffer;

const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal

/// How the supervised command ended, as far as the run is concerned.
#[derive(Debug)]
pub enum RunOutcome {
    Exited(ExitStatus),
    StartFailed(io::Error),
    WaitFailed(io::Error),
    SignalRelayFailed(RelayError),
    SchedulerFailed(ScheduleError<CheckRunErr>),
}

impl RunOutcome {
    pub fn conclusion(&self) -> CheckRunConclusion {
        match self {
            RunOutcome::Exited(status) if status.success() => CheckRunConclusion::Success,
            _ => CheckRunConclusion::Failure,
        }
    }

    /// The run's result once every report has been delivered.
    pub fn into_result(self, command_line: &str) -> Result<CommandExit> {
        match self {
            RunOutcome::Exited(status) => Ok(CommandExit::from(status)),
            RunOutcome::StartFailed(source) => Err(CheckRunErr::Start {
                command: command_line.to_string(),
                source,
            }),
            RunOutcome::WaitFailed(source) => Err(CheckRunErr::Wait {
                command: command_line.to_string(),
                source,
            }),
            RunOutcome::SignalRelayFailed(err) => Err(CheckRunErr::SignalRelay(err)),
            RunOutcome::SchedulerFailed(ScheduleError::Callback(err)) => {
                Err(CheckRunErr::Scheduler(Box::new(err)))
            }
            RunOutcome::SchedulerFailed(ScheduleError::Join(err)) => {
                Err(CheckRunErr::SchedulerTask(err))
            }
        }
    }
}

/// Exit status of a command that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl CommandExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Code to exit this process with so callers see what the command did.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => EXIT_CODE_SIGNAL_BASE + signal,
            (None, None) => 1,
        }
    }
}

impl From<ExitStatus> for CommandExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Runs one command and keeps its check run in sync.
pub struct CheckRunner {
    context: Arc<RunContext>,
    checks: Arc<dyn ChecksService>,
    clock: Arc<dyn Clock>,
    terminal: Arc<TerminalBuffer>,
    mirrors: Vec<Box<dyn Write + Send>>,
    signals: Option<SignalSubscription>,
}

impl CheckRunner {
    pub fn new(context: RunContext, checks: Arc<dyn ChecksService>) -> Self {
        Self {
            context: Arc::new(context),
            checks,
            clock: Arc::new(SystemClock),
            terminal: Arc::new(TerminalBuffer::new()),
            mirrors: Vec::new(),
            signals: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_terminal(mut self, terminal: Arc<TerminalBuffer>) -> Self {
        self.terminal = terminal;
        self
    }

    /// Adds a sink that receives the command's raw output as it arrives.
    pub fn with_mirror(mut self, mirror: Box<dyn Write + Send>) -> Self {
        self.mirrors.push(mirror);
        self
    }

    /// Uses `signals` instead of installing OS signal handlers.
    pub fn with_signals(mut self, signals: SignalSubscription) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn terminal(&self) -> Arc<TerminalBuffer> {
        self.terminal.clone()
    }

    /// Runs the command to completion.
    ///
    /// Returns the command's exit status when every report was delivered,
    /// whether or not the command itself succeeded. A failure to deliver the
    /// final report takes precedence over every other result.
    pub async fn run(self) -> Result<CommandExit> {
        let CheckRunner {
            context,
            checks,
            clock,
            terminal,
            mirrors,
            signals,
        } = self;
        context.validate()?;
        let command_line = context.command_line();

        let subscription = match signals {
            Some(subscription) => subscription,
            None => SignalSubscription::os().map_err(CheckRunErr::SignalSetup)?,
        };

        let reporter = Arc::new(CheckRunReporter::new(
            context.clone(),
            checks,
            clock.clone(),
            terminal.clone(),
        ));
        let fanout = Arc::new(OutputFanout::with_mirrors(terminal.clone(), mirrors));

        let mut supervisor = match ProcessSupervisor::spawn(&context.command, fanout) {
            Ok(supervisor) => supervisor,
            Err(source) => {
                let message = format!("error starting command {command_line}: {source}");
                warn!("{message}");
                terminal.write_bytes(message.as_bytes());
                let outcome = RunOutcome::StartFailed(source);
                reporter.create(Some(outcome.conclusion())).await?;
                return outcome.into_result(&command_line);
            }
        };

        let check_run_id = match reporter.create(None).await {
            Ok(id) => id,
            Err(err) => {
                if let Err(kill_err) = supervisor.kill().await {
                    warn!("failed to stop command after create error: {kill_err}");
                }
                supervisor.drain_output(Some(KILL_DRAIN_GRACE)).await;
                return Err(err);
            }
        };
        info!(%check_run_id, command = %command_line, "command running");

        let mut relay = match supervisor.pid() {
            Some(pid) => Some(SignalRelay::spawn(subscription, pid, supervisor.exit_flag())),
            None => {
                warn!("command has no pid; signals will not be relayed");
                None
            }
        };

        let mut ticker = {
            let reporter = reporter.clone();
            SyncScheduler::start(clock, context.update_interval, move || {
                let reporter = reporter.clone();
                async move { reporter.update(None).await }
            })
        };

        let outcome = tokio::select! {
            status = supervisor.wait() => match status {
                Ok(status) => RunOutcome::Exited(status),
                Err(err) => RunOutcome::WaitFailed(err),
            },
            err = relay_failed(relay.as_mut()) => RunOutcome::SignalRelayFailed(err),
            err = ticker.failed() => RunOutcome::SchedulerFailed(err),
        };
        debug!(?outcome, "run outcome decided");

        // Nothing may be sent concurrently with or after the final report.
        if let Err(err) = ticker.shutdown().await {
            warn!("periodic update failed while the command was finishing: {err}");
        }
        if let Some(relay) = relay.take() {
            relay.shutdown().await;
        }

        if matches!(outcome, RunOutcome::Exited(_)) {
            supervisor.drain_output(None).await;
        } else {
            match supervisor.kill().await {
                Ok(status) => debug!(%status, "command stopped"),
                Err(err) => warn!("failed to stop command: {err}"),
            }
            supervisor.drain_output(Some(KILL_DRAIN_GRACE)).await;
        }

        let conclusion = outcome.conclusion();
        if let Err(err) = reporter.update(Some(conclusion)).await {
            if !matches!(outcome, RunOutcome::Exited(_)) {
                warn!(?outcome, "run failed before the final report could be sent");
            }
            return Err(CheckRunErr::FinalReport(Box::new(err)));
        }
        info!(%check_run_id, ?conclusion, "check run completed");

        outcome.into_result(&command_line)
    }
}

async fn relay_failed(relay: Option<&mut SignalRelay>) -> RelayError {
    match relay {
        Some(relay) => relay.failed().await,
        None => std::future::pending().await,
    }
}
