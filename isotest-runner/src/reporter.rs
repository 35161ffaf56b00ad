//! The reporter port: a three-level factory hierarchy (top -> suite ->
//! test -> test case) that receives results as a run progresses.
//!
//! A test-case reporter is cancelled by dropping it before calling
//! `complete`: implementations must treat a later `start`/`complete` on an
//! already-destroyed reporter as a silent no-op, not an error, since the
//! dispatch loop never calls either again once a reporter scope ends.

use crate::result::CaseResult;

/// Per-test-case reporter. `start` and `complete` must each be called at
/// most once, in that order; dropping the reporter before `complete` is
/// observed by the report as a cancellation.
pub trait TestCaseReporter {
    /// The case is about to run.
    fn start(&mut self, name: &str);
    /// The case finished; takes ownership of its result.
    fn complete(&mut self, result: CaseResult);
}

/// Per-test reporter. Mints [`TestCaseReporter`]s for cases belonging to
/// this test; implementations may refuse (panic or ignore, at their
/// discretion) a case name that does not belong to the test this reporter
/// was minted for.
pub trait TestReporter {
    /// Open a reporter for one of this test's cases.
    fn open_case(&mut self, name: &str) -> Box<dyn TestCaseReporter + '_>;
}

/// Per-suite reporter. Mints [`TestReporter`]s for tests belonging to this
/// suite.
pub trait SuiteReporter {
    /// Open a reporter for one of this suite's tests.
    fn open_test(&mut self, name: &str) -> Box<dyn TestReporter + '_>;
}

/// The top-level reporter; mints [`SuiteReporter`]s for each suite a run
/// dispatch touches.
pub trait Reporter {
    /// Open a reporter for a suite about to run.
    fn open_suite(&mut self, name: &str) -> Box<dyn SuiteReporter + '_>;
}
