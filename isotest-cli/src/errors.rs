//! Top-level CLI error, wrapping the engine's errors in a
//! [`miette::Diagnostic`] for presentation. Mirrors the engine crate's
//! convention of keeping miette at the outermost boundary only --
//! `isotest-runner` itself never depends on miette.

use isotest_runner::errors::{LoaderError, RunnerError};
use miette::Diagnostic;
use thiserror::Error;

/// The CLI's top-level error type.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    /// A module failed to load.
    #[error(transparent)]
    #[diagnostic(code(isotest::load))]
    Loader(#[from] LoaderError),

    /// An infrastructure error occurred while running a suite.
    #[error(transparent)]
    #[diagnostic(code(isotest::run))]
    Runner(#[from] RunnerError),

    /// No modules were given on the command line.
    #[error("no modules given")]
    #[diagnostic(code(isotest::usage), help("pass at least one module path"))]
    NoModules,

    /// Configuration could not be read or parsed.
    #[error("failed to load configuration")]
    #[diagnostic(code(isotest::config))]
    Config(#[source] std::io::Error),
}
