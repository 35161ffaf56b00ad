//! `run`/`ls` subcommand dispatch.

use crate::errors::CliError;
use crate::reporter::TextReporter;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use isotest_runner::config::IsotestConfig;
use isotest_runner::loader;
use isotest_runner::runner::{dispatch, RunnerKind};
use std::time::Duration;

/// Natively compiled unit test module runner.
#[derive(Parser, Debug)]
#[command(name = "isotest", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run all suites in the given modules.
    Run {
        /// Modules to load and run.
        #[arg(required = true)]
        modules: Vec<Utf8PathBuf>,
        /// Use the in-process direct runner instead of the forking runner.
        #[arg(short = 'n', long)]
        direct: bool,
        /// Abort a test case that runs longer than this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List `<suite>:<test>` pairs across the given modules.
    Ls {
        /// Modules to load and list.
        #[arg(required = true)]
        modules: Vec<Utf8PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ListFormat {
    Text,
    Json,
}

fn strip_prefixes(name: &str) -> &str {
    name.strip_prefix("testsuite_")
        .or_else(|| name.strip_prefix("test_"))
        .unwrap_or(name)
}

/// Run the `run` subcommand. Returns the process exit code.
pub fn run(modules: Vec<Utf8PathBuf>, direct: bool, timeout: Option<u64>) -> Result<i32, CliError> {
    if modules.is_empty() {
        return Err(CliError::NoModules);
    }

    let config = IsotestConfig::load(camino::Utf8Path::new("."))
        .map_err(CliError::Config)?;

    let kind = if direct {
        RunnerKind::Direct
    } else {
        config.runner_kind.into()
    };
    let timeout = timeout
        .map(Duration::from_secs)
        .or_else(|| config.timeout());

    let temp_dir = config.resolved_temp_dir();
    let suites = loader::load_suites(&modules)?;
    let mut reporter = TextReporter;
    let failures = dispatch::run_testsuites(suites, kind, timeout, &temp_dir, &mut reporter)?;

    Ok(if failures > 0 { 1 } else { 0 })
}

/// Run the `ls` subcommand. Returns the process exit code.
pub fn ls(modules: Vec<Utf8PathBuf>, format: ListFormat) -> Result<i32, CliError> {
    if modules.is_empty() {
        return Err(CliError::NoModules);
    }

    let suites = loader::load_suites(&modules)?;
    match format {
        ListFormat::Text => {
            for suite in &suites {
                for test in &suite.tests {
                    println!(
                        "{}:{}",
                        strip_prefixes(&suite.name),
                        strip_prefixes(&test.name)
                    );
                }
            }
        }
        ListFormat::Json => {
            for suite in &suites {
                for test in &suite.tests {
                    let line = serde_json::json!({
                        "suite": strip_prefixes(&suite.name),
                        "test": strip_prefixes(&test.name),
                        "cases": test.cases.len(),
                    });
                    println!("{line}");
                }
            }
        }
    }
    Ok(0)
}
