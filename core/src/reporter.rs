use std::sync::Arc;
use std::sync::OnceLock;

use tokio::sync::Mutex;
use tracing::debug;

use crate::checks::CheckRunConclusion;
use crate::checks::CheckRunId;
use crate::checks::CheckRunReport;
use crate::checks::CheckRunStatus;
use crate::checks::ChecksService;
use crate::checks::CreateCheckRun;
use crate::checks::UpdateCheckRun;
use crate::clock::Clock;
use crate::context::RunContext;
use crate::error::CheckRunErr;
use crate::error::Result;
use crate::output::build_output;
use crate::terminal::TerminalBuffer;

/// Sends reports for the check run of one invocation.
///
/// Every send holds `send_lock` from assembling the payload until the service
/// call returns, so two reports of the same run are never in flight at once
/// and a report never carries a snapshot older than the one before it.
pub(crate) struct CheckRunReporter {
    context: Arc<RunContext>,
    checks: Arc<dyn ChecksService>,
    clock: Arc<dyn Clock>,
    terminal: Arc<TerminalBuffer>,
    check_run_id: OnceLock<CheckRunId>,
    send_lock: Mutex<()>,
}

impl CheckRunReporter {
    pub(crate) fn new(
        context: Arc<RunContext>,
        checks: Arc<dyn ChecksService>,
        clock: Arc<dyn Clock>,
        terminal: Arc<TerminalBuffer>,
    ) -> Self {
        Self {
            context,
            checks,
            clock,
            terminal,
            check_run_id: OnceLock::new(),
            send_lock: Mutex::new(()),
        }
    }

    fn report(&self, conclusion: Option<CheckRunConclusion>) -> Result<CheckRunReport> {
        let output = build_output(&self.context, &self.terminal.snapshot())?;
        let (status, completed_at) = match conclusion {
            Some(_) => (CheckRunStatus::Completed, Some(self.clock.now())),
            None => (CheckRunStatus::InProgress, None),
        };
        Ok(CheckRunReport {
            status,
            conclusion,
            completed_at,
            output,
        })
    }

    /// Creates the check run. With a conclusion the run is created already
    /// completed and no update is expected to follow.
    pub(crate) async fn create(&self, conclusion: Option<CheckRunConclusion>) -> Result<CheckRunId> {
        let _guard = self.send_lock.lock().await;
        let ctx = &self.context;
        let request = CreateCheckRun {
            name: ctx.name.clone(),
            head_sha: ctx.commit_sha.clone(),
            details_url: ctx.details_url.clone(),
            external_id: ctx.external_id.clone(),
            report: self.report(conclusion)?,
        };
        let id = self
            .checks
            .create_check_run(&ctx.owner, &ctx.repository, &request)
            .await
            .map_err(|source| CheckRunErr::CreateCheckRun {
                name: ctx.name.clone(),
                source,
            })?;
        let id = *self.check_run_id.get_or_init(|| id);
        debug!(check_run_id = %id, status = ?request.report.status, "check run created");
        Ok(id)
    }

    pub(crate) async fn update(&self, conclusion: Option<CheckRunConclusion>) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        let id = *self
            .check_run_id
            .get()
            .ok_or(CheckRunErr::MissingCheckRun)?;
        let ctx = &self.context;
        let request = UpdateCheckRun {
            name: ctx.name.clone(),
            details_url: ctx.details_url.clone(),
            external_id: ctx.external_id.clone(),
            report: self.report(conclusion)?,
        };
        self.checks
            .update_check_run(&ctx.owner, &ctx.repository, id, &request)
            .await
            .map_err(|source| CheckRunErr::UpdateCheckRun { id, source })?;
        debug!(check_run_id = %id, status = ?request.report.status, "check run updated");
        Ok(())
    }
}
