//! Entry point for the `leasehold` CLI.
//!
//! Parses arguments, sets up logging, dispatches to the command handler, and
//! maps errors to exit codes. Contention (exit 3) is reported without output.

use leasehold::cli::Cli;
use leasehold::logging::{init_logging, level_for_verbosity, parse_log_level};
use leasehold::{commands, exit_codes};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let level = match cli.log_level.as_deref().map(parse_log_level) {
        Some(Ok(level)) => level,
        Some(Err(err)) => {
            eprintln!("Error: {}", err);
            return ExitCode::from(err.exit_code() as u8);
        }
        None => level_for_verbosity(cli.verbose),
    };
    init_logging(level);

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            if !err.is_silent() {
                eprintln!("Error: {}", err);
            }
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
