mod args;
mod commands;
mod lifecycle;
mod session;
mod shared;

use clap::Parser;
use std::process::ExitCode;

use args::{AppCommand, Cli};
use commands::{run_mount, run_status};
use shared::logging::init_logging;

// Top-level entrypoint: parse CLI args, set up logging and dispatch to a command module.
// The exit code is the negated session status, so callers see the errno of the failure.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        AppCommand::Mount(args) => run_mount(args).into(),
        AppCommand::Status(args) => match run_status(args) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "status failed");
                ExitCode::from(2)
            }
        },
    }
}
