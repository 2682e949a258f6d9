use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::attachments::AttachmentError;
use crate::checks::ChecksError;
use crate::checks::CheckRunId;
use crate::signals::RelayError;

pub type Result<T> = std::result::Result<T, CheckRunErr>;

#[derive(Error, Debug)]
pub enum CheckRunErr {
    /// The command could not be launched. A single failed check run has
    /// already been reported when this is returned.
    #[error("error starting command {command}")]
    Start {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers")]
    SignalSetup(#[source] io::Error),

    #[error("failed waiting for command {command}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("signal relay failed")]
    SignalRelay(#[from] RelayError),

    /// A periodic update failed and aborted the schedule.
    #[error("periodic check run update failed")]
    Scheduler(#[source] Box<CheckRunErr>),

    #[error("periodic update task failed")]
    SchedulerTask(#[source] tokio::task::JoinError),

    #[error("failed to create check run {name}")]
    CreateCheckRun {
        name: String,
        #[source]
        source: ChecksError,
    },

    #[error("failed to update check run {id}")]
    UpdateCheckRun {
        id: CheckRunId,
        #[source]
        source: ChecksError,
    },

    /// The closing report could not be delivered. This wins over any other
    /// result of the run, including a successful command.
    #[error("failed to send final check run report")]
    FinalReport(#[source] Box<CheckRunErr>),

    #[error("failed to read summary file {}", path.display())]
    Summary {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error("check run has not been created yet")]
    MissingCheckRun,

    #[error("invalid run configuration: {0}")]
    InvalidContext(String),
}

impl CheckRunErr {
    /// Returns the launch error when the command never started.
    pub fn start_error(&self) -> Option<&io::Error> {
        match self {
            CheckRunErr::Start { source, .. } => Some(source),
            _ => None,
        }
    }
}
