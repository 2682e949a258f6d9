use std::path::PathBuf;
use std::time::Duration;

use crate::error::CheckRunErr;
use crate::error::Result;

/// Interval between two periodic check run updates unless configured.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Everything one invocation needs to know about the check run it drives and
/// the command it supervises. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub owner: String,
    pub repository: String,
    pub commit_sha: String,
    pub name: String,
    pub title: String,
    pub details_url: Option<String>,
    pub external_id: Option<String>,
    /// Literal summary text, or the path of a file holding it.
    pub summary: String,
    pub images_dir: Option<PathBuf>,
    pub annotations_dir: Option<PathBuf>,
    pub update_interval: Duration,
    /// Language tag of the fenced block the output is rendered in.
    pub syntax_highlight: String,
    pub debug: bool,
    pub command: Vec<String>,
}

impl RunContext {
    /// An empty command is not rejected here: it fails to start like any
    /// other unrunnable command and is reported on the check run.
    pub fn validate(&self) -> Result<()> {
        if self.update_interval.is_zero() {
            return Err(CheckRunErr::InvalidContext(
                "update interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The command as a single space separated line, for messages.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
