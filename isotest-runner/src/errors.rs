//! Errors produced by the execution engine.

use crate::suite::Stage;
use camino::Utf8PathBuf;
use thiserror::Error;

/// An error encountered while decoding a flattened [`crate::Failure`] buffer.
#[derive(Clone, Debug, Error)]
#[error("malformed failure buffer: {reason}")]
#[non_exhaustive]
pub struct DecodeError {
    reason: &'static str,
}

impl DecodeError {
    pub(crate) fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// An error encountered by the event codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying descriptor returned an I/O error.
    #[error("event channel I/O error")]
    Io(#[source] std::io::Error),

    /// A failure payload could not be decoded.
    #[error("malformed failure event")]
    MalformedFailure(#[source] DecodeError),

    /// The header declared an event type the reader does not recognize.
    #[error("unrecognized event type {0}")]
    UnknownEventType(u16),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// An error encountered while installing or restoring signal capture.
#[derive(Debug, Error)]
pub enum SignalError {
    /// A handler is already installed; a second installation was attempted.
    #[error("signal capture is already installed")]
    AlreadyInstalled,

    /// No handler was installed; restoration was attempted anyway.
    #[error("signal capture is not installed")]
    NotInstalled,

    /// The underlying `sigaction`/`sigprocmask` call failed.
    #[error("signal capture syscall failed for {signal}")]
    Syscall {
        /// The signal being installed or restored when the call failed.
        signal: i32,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// An error encountered while running the test-case driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Fixture setup reported a failure without explicitly aborting.
    #[error("setup failed at {stage:?}")]
    SetupFailed {
        /// The stage the failure was recorded at.
        stage: Stage,
    },

    /// Signal capture could not be installed or restored around the case.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Saving, redirecting, or restoring a standard stream, or creating the
    /// redirected-output temp file, failed.
    #[error("stream redirection failed")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// An error encountered while loading a dynamic module.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The dynamic library itself failed to load.
    #[error("failed to load module `{path}`")]
    Load {
        /// The module path that failed to load.
        path: Utf8PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The well-known suite symbol was missing.
    #[error("module `{path}` does not export a suite symbol")]
    MissingSuiteSymbol {
        /// The module path that was missing the symbol.
        path: Utf8PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The suite's magic constant did not match the expected value.
    #[error("module `{path}` has bad magic {found:#x}, expected {expected:#x}")]
    BadMagic {
        /// The module path with the bad magic.
        path: Utf8PathBuf,
        /// The magic constant actually found.
        found: u32,
        /// The magic constant expected.
        expected: u32,
    },

    /// The suite's ABI version did not match the expected value.
    #[error("module `{path}` has unsupported ABI version {found}, expected {expected}")]
    BadVersion {
        /// The module path with the bad version.
        path: Utf8PathBuf,
        /// The ABI version actually found.
        found: u32,
        /// The ABI version expected.
        expected: u32,
    },
}

/// An infrastructure error encountered while running a suite, test, or test
/// case -- as opposed to a test-level failure, which is captured in a
/// [`crate::CaseResult`] instead of propagated as an `Err`.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Creating a pipe, forking, or waiting for a child failed.
    #[error("infrastructure failure running test case `{testcase}`")]
    Infrastructure {
        /// The display name of the test case that was running.
        testcase: String,
        #[source]
        source: std::io::Error,
    },

    /// The event channel could not be decoded.
    #[error("event channel error running test case `{testcase}`")]
    Codec {
        /// The display name of the test case that was running.
        testcase: String,
        #[source]
        source: CodecError,
    },

    /// Signal capture could not be installed or restored.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// A child process's watchdog deadline elapsed.
    #[error("test case `{testcase}` timed out after {elapsed_secs}s")]
    Timeout {
        /// The display name of the test case that timed out.
        testcase: String,
        /// How many seconds elapsed before the watchdog fired.
        elapsed_secs: u64,
    },
}
