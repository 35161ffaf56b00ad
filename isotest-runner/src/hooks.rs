//! Execution hooks (the sink the test-case driver reports to) and
//! dynamic-ops hooks (the surface a loaded module's assertion runtime
//! calls back into).

use crate::failure::Failure;
use crate::suite::Stage;

/// Which non-local exit a test case took. Re-entering abort during
/// teardown preserves the earlier tag: a teardown failure cannot demote a
/// prior `Fail` to `Skip`, and a teardown skip cannot promote a prior
/// `Skip` to `Fail`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortKind {
    /// An assertion failure was reported.
    Fail,
    /// The test case was explicitly skipped.
    Skip,
}

/// The sink the test-case driver uses to report stage transitions, skips,
/// and failures. `on_skip` and `on_failure` never return: the forking
/// runner's implementation exits the child process, and the direct
/// runner's implementation jumps back to the point established before the
/// case began. Neither uses Rust unwinding -- the case body runs behind an
/// `extern "C"` boundary this crate does not control the compilation of,
/// so no implementation may rely on unwind-table guarantees for that
/// frame.
pub trait ExecutionHooks {
    /// Announce a stage transition.
    fn on_stage_change(&mut self, stage: Stage);

    /// Report a skip and unwind. Never returns.
    fn on_skip(&mut self, failure: Failure) -> !;

    /// Report a failure and unwind. Never returns.
    fn on_failure(&mut self, failure: Failure) -> !;
}

/// Holds the first reported failure and the current abort tag for one
/// test-case execution. This is the state a loaded module's dynamic-ops
/// pointer cell is overwritten with for the duration of the call.
#[derive(Default)]
pub struct DynamicOpsState {
    failure: Option<Failure>,
    abort_kind: Option<AbortKind>,
}

impl DynamicOpsState {
    /// A fresh, empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure report. First-failure-wins: subsequent reports are
    /// dropped silently.
    pub fn report_failure(&mut self, failure: Failure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    /// Record an abort. Returns the *effective* abort kind, which is the
    /// first one ever recorded (a later call cannot demote or promote it).
    pub fn abort(&mut self, kind: AbortKind) -> AbortKind {
        *self.abort_kind.get_or_insert(kind)
    }

    /// The current abort tag, if any abort has been recorded.
    pub fn abort_kind(&self) -> Option<AbortKind> {
        self.abort_kind
    }

    /// Borrow the recorded failure, if any.
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Take ownership of the recorded failure, if any.
    pub fn take_failure(&mut self) -> Option<Failure> {
        self.failure.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let mut state = DynamicOpsState::new();
        state.report_failure(Failure::new(Stage::Execution, "first", None, None));
        state.report_failure(Failure::new(Stage::Execution, "second", None, None));
        assert_eq!(state.failure().unwrap().description, "first");
    }

    #[test]
    fn teardown_abort_cannot_demote_prior_fail_to_skip() {
        let mut state = DynamicOpsState::new();
        assert_eq!(state.abort(AbortKind::Fail), AbortKind::Fail);
        assert_eq!(state.abort(AbortKind::Skip), AbortKind::Fail);
    }

    #[test]
    fn teardown_abort_cannot_promote_prior_skip_to_fail() {
        let mut state = DynamicOpsState::new();
        assert_eq!(state.abort(AbortKind::Skip), AbortKind::Skip);
        assert_eq!(state.abort(AbortKind::Fail), AbortKind::Skip);
    }
}
