use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use bfwasm_cli::cli::Cli;
use bfwasm_cli::{describe, execute, exit_code, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init_logging(cli.debug, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    debug!("{:?}", cli.command);

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", describe(&err));
            ExitCode::from(exit_code(&err))
        }
    }
}
