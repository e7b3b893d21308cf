mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let work = async {
        match cli.command {
            Command::Run(args) => commands::run(args).await,
            Command::Cases(args) => commands::cases(args),
        }
    };

    // Dropping `work` aborts the case tasks; their subprocesses are killed on drop.
    let result = tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting run");
            return ExitCode::from(130);
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
