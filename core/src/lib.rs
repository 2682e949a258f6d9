//! Root of the `checks4shell-core` library.
//!
//! Runs a command, renders its output through a terminal emulator and keeps a
//! GitHub check run in sync with what the command printed until it exits.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the mirrors handed to the runner.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod attachments;
pub mod auth;
pub mod checks;
pub mod clock;
mod context;
pub mod error;
mod output;
mod reporter;
mod runner;
pub mod scheduler;
pub mod signals;
mod supervisor;
pub mod terminal;

pub use context::DEFAULT_UPDATE_INTERVAL;
pub use context::RunContext;
pub use output::SUMMARY_LIMIT;
pub use output::TEXT_LIMIT;
pub use output::fence_output;
pub use runner::CheckRunner;
pub use runner::CommandExit;
pub use runner::RunOutcome;
pub use supervisor::OutputFanout;
