//! Entry point: parses arguments, sets up a tracing subscriber, and
//! dispatches to the `run`/`ls` subcommand.

use clap::Parser;
use isotest_cli::dispatch::{self, Cli, Command};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            modules,
            direct,
            timeout,
        } => dispatch::run(modules, direct, timeout),
        Command::Ls { modules, format } => dispatch::ls(modules, format),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            std::process::exit(3);
        }
    }
}
