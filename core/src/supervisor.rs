use std::io;
use std::io::Write;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use nix::unistd::Pid;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::terminal::TerminalBuffer;

// I/O buffer sizing
const READ_CHUNK_SIZE: usize = 8192; // bytes per read

/// How long output pumps may keep running after the child was killed.
pub(crate) const KILL_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Destination of everything the child writes on stdout and stderr.
///
/// Mirrors see each chunk first, then the chunk is applied to the terminal.
/// A mirror that fails is dropped; it never stops the terminal from
/// receiving output.
pub struct OutputFanout {
    terminal: Arc<TerminalBuffer>,
    mirrors: Mutex<Vec<Box<dyn Write + Send>>>,
}

impl OutputFanout {
    pub fn new(terminal: Arc<TerminalBuffer>) -> Self {
        Self {
            terminal,
            mirrors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mirrors(terminal: Arc<TerminalBuffer>, mirrors: Vec<Box<dyn Write + Send>>) -> Self {
        Self {
            terminal,
            mirrors: Mutex::new(mirrors),
        }
    }

    pub fn terminal(&self) -> &Arc<TerminalBuffer> {
        &self.terminal
    }

    pub fn write_chunk(&self, chunk: &[u8]) {
        {
            let mut mirrors = self
                .mirrors
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            mirrors.retain_mut(|mirror| {
                match mirror.write_all(chunk).and_then(|()| mirror.flush()) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("dropping output mirror after write error: {err}");
                        false
                    }
                }
            });
        }
        self.terminal.write_bytes(chunk);
    }
}

impl std::fmt::Debug for OutputFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mirrors = self
            .mirrors
            .lock()
            .map(|mirrors| mirrors.len())
            .unwrap_or_default();
        f.debug_struct("OutputFanout")
            .field("terminal", &self.terminal)
            .field("mirrors", &mirrors)
            .finish()
    }
}

/// Owns the supervised child and the tasks pumping its output.
pub(crate) struct ProcessSupervisor {
    child: Child,
    pid: Option<Pid>,
    pumps: Vec<JoinHandle<io::Result<()>>>,
    exited: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    pub(crate) fn spawn(command: &[String], fanout: Arc<OutputFanout>) -> io::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no command given"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Both pipes were configured above, so `take()` only fails if tokio
        // changes its contract.
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout pipe was unexpectedly not available"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr pipe was unexpectedly not available"))?;

        let pid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        debug!(pid = ?pid, program = %program, "command started");

        let pumps = vec![
            tokio::spawn(pump_output(stdout, fanout.clone())),
            tokio::spawn(pump_output(stderr, fanout)),
        ];

        Ok(Self {
            child,
            pid,
            pumps,
            exited: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Set once the child has been reaped. Signals are no longer forwarded
    /// after that point since the pid may have been reused.
    pub(crate) fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exited.clone()
    }

    /// Waits for the child to exit. Cancel safe.
    pub(crate) async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.exited.store(true, Ordering::Release);
        debug!(pid = ?self.pid, %status, "command exited");
        Ok(status)
    }

    pub(crate) async fn kill(&mut self) -> io::Result<ExitStatus> {
        if !self.exited.load(Ordering::Acquire) {
            if let Err(err) = self.child.start_kill() {
                debug!("start_kill failed: {err}");
            }
        }
        self.wait().await
    }

    /// Waits for both output pumps to reach EOF so the terminal holds
    /// everything the child wrote. With a `grace` period, pumps still running
    /// afterwards are aborted; a grandchild can keep the pipes open after the
    /// child itself is gone.
    pub(crate) async fn drain_output(&mut self, grace: Option<Duration>) {
        for mut pump in std::mem::take(&mut self.pumps) {
            let result = match grace {
                Some(grace) => match tokio::time::timeout(grace, &mut pump).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("output still open {grace:?} after kill; abandoning it");
                        pump.abort();
                        continue;
                    }
                },
                None => pump.await,
            };
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("reading command output failed: {err}"),
                Err(err) => warn!("output pump task failed: {err}"),
            }
        }
    }
}

async fn pump_output<R: AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    fanout: Arc<OutputFanout>,
) -> io::Result<()> {
    let mut tmp = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        fanout.write_chunk(&tmp[..n]);
    }
    Ok(())
}
