use std::process::ExitCode;

use clap::Parser;

use sem2sql_cli::{cli, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Cli::parse();
    if let Err(err) = telemetry::init(args.verbose) {
        eprintln!("failed to initialize logging: {err:#}");
    }

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
