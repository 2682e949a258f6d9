use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use checks4shell_core::CheckRunner;
use checks4shell_core::RunContext;
use checks4shell_core::error::CheckRunErr;
use clap::Args;
use tracing::debug;
use tracing::error;

use crate::credentials::CredentialArgs;

/// Exit code when the command could not be found.
const EXIT_NOT_FOUND: i32 = 127;
/// Exit code when the command was found but could not be executed.
const EXIT_NOT_EXECUTABLE: i32 = 126;
const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Owner of the repository the check run belongs to.
    #[arg(short = 'o', long, env = "CHECKS4SHELL_OWNER")]
    pub owner: String,

    #[arg(short = 'r', long, env = "CHECKS4SHELL_REPOSITORY")]
    pub repository: String,

    /// Commit the check run is attached to.
    #[arg(short = 'c', long, env = "CHECKS4SHELL_COMMIT_SHA", value_name = "SHA")]
    pub commit_sha: String,

    /// Name of the check run.
    #[arg(short = 'n', long, env = "CHECKS4SHELL_NAME")]
    pub name: String,

    #[arg(short = 't', long, env = "CHECKS4SHELL_TITLE")]
    pub title: String,

    #[arg(short = 'u', long, env = "CHECKS4SHELL_DETAILS_URL", value_name = "URL")]
    pub details_url: Option<String>,

    #[arg(short = 'e', long, env = "CHECKS4SHELL_EXTERNAL_ID", value_name = "ID")]
    pub external_id: Option<String>,

    /// Summary text, or the path of a file holding it. The file is re-read
    /// for every update.
    #[arg(short = 's', long, env = "CHECKS4SHELL_SUMMARY", default_value = "")]
    pub summary: String,

    /// Directory of image JSON files.
    #[arg(short = 'i', long, env = "CHECKS4SHELL_IMAGES", value_name = "DIR")]
    pub images: Option<PathBuf>,

    /// Directory of annotation JSON files.
    #[arg(short = 'a', long, env = "CHECKS4SHELL_ANNOTATIONS", value_name = "DIR")]
    pub annotations: Option<PathBuf>,

    /// Time between two updates while the command runs, e.g. `5s` or `1m`.
    /// Must not be zero.
    #[arg(
        short = 'f',
        long,
        env = "CHECKS4SHELL_UPDATE_FREQUENCY",
        default_value = "5s",
        value_parser = humantime::parse_duration,
        value_name = "DURATION"
    )]
    pub update_frequency: Duration,

    /// Language tag of the code block the output is shown in.
    #[arg(
        short = 'l',
        long,
        env = "CHECKS4SHELL_SYNTAX_HIGHLIGHT",
        default_value = "",
        value_name = "LANG"
    )]
    pub syntax_highlight: String,

    /// Verbose logging; without credentials also prints every payload.
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl RunArgs {
    pub fn into_context(self) -> RunContext {
        RunContext {
            owner: self.owner,
            repository: self.repository,
            commit_sha: self.commit_sha,
            name: self.name,
            title: self.title,
            details_url: self.details_url,
            external_id: self.external_id,
            summary: self.summary,
            images_dir: self.images,
            annotations_dir: self.annotations,
            update_interval: self.update_frequency,
            syntax_highlight: self.syntax_highlight,
            debug: self.debug,
            command: self.command,
        }
    }
}

/// Runs the command and returns the code this process should exit with.
pub async fn run_main(args: RunArgs, credentials: &CredentialArgs) -> Result<i32> {
    let checks = credentials.checks_service(args.debug)?;
    let runner = CheckRunner::new(args.into_context(), checks).with_mirror(Box::new(io::stdout()));

    match runner.run().await {
        Ok(exit) => {
            debug!(?exit, "command finished");
            Ok(exit.exit_code())
        }
        Err(err) => {
            let code = exit_code_for_error(&err);
            error!("{:#}", anyhow::Error::new(err));
            Ok(code)
        }
    }
}

pub fn exit_code_for_error(err: &CheckRunErr) -> i32 {
    match err.start_error().map(io::Error::kind) {
        Some(io::ErrorKind::NotFound) => EXIT_NOT_FOUND,
        Some(io::ErrorKind::PermissionDenied) => EXIT_NOT_EXECUTABLE,
        _ => EXIT_FAILURE,
    }
}
