pub mod credentials;
pub mod logging;
pub mod run_cmd;

use clap::Parser;
use clap::Subcommand;

use crate::credentials::CredentialArgs;
use crate::run_cmd::RunArgs;

/// Runs a command and mirrors its output into a GitHub check run.
#[derive(Debug, Parser)]
#[command(name = "checks4shell", version, bin_name = "checks4shell")]
pub struct Cli {
    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(subcommand)]
    pub subcommand: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a command and report its output as a check run.
    Run(RunArgs),

    /// Print the version.
    Version,
}

pub fn version_line() -> String {
    format!("checks4shell version: {}", env!("CARGO_PKG_VERSION"))
}
