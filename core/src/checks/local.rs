use std::io;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use super::CheckRunId;
use super::ChecksError;
use super::ChecksService;
use super::CreateCheckRun;
use super::UpdateCheckRun;

/// Id handed out when no check run is actually created.
pub const LOCAL_CHECK_RUN_ID: CheckRunId = CheckRunId(-1);

/// Stand-in for the GitHub API when no credentials are configured.
///
/// Nothing leaves the machine. With `debug` set, every payload that would
/// have been sent is pretty printed to the diagnostic writer instead.
pub struct LocalChecksService {
    debug: bool,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl LocalChecksService {
    pub fn new(debug: bool) -> Self {
        Self::with_writer(debug, Box::new(io::stderr()))
    }

    pub fn with_writer(debug: bool, writer: Box<dyn Write + Send>) -> Self {
        Self {
            debug,
            writer: Mutex::new(writer),
        }
    }

    fn dump<T: Serialize>(
        &self,
        kind: &str,
        owner: &str,
        repo: &str,
        id: CheckRunId,
        payload: &T,
    ) -> Result<(), ChecksError> {
        if !self.debug {
            return Ok(());
        }
        let pretty = serde_json::to_string_pretty(payload)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        write!(writer, "\nSending {kind}:{owner}, {repo}, {id}, {pretty}\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for LocalChecksService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChecksService")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChecksService for LocalChecksService {
    async fn create_check_run(
        &self,
        owner: &str,
        repo: &str,
        request: &CreateCheckRun,
    ) -> Result<CheckRunId, ChecksError> {
        self.dump("CreateCheckRun", owner, repo, LOCAL_CHECK_RUN_ID, request)?;
        Ok(LOCAL_CHECK_RUN_ID)
    }

    async fn update_check_run(
        &self,
        owner: &str,
        repo: &str,
        id: CheckRunId,
        request: &UpdateCheckRun,
    ) -> Result<(), ChecksError> {
        self.dump("UpdateCheckRun", owner, repo, id, request)
    }
}
