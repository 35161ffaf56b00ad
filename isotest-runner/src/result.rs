//! The outcome of running one test case.

use crate::failure::Failure;
use crate::output::Output;

/// The outcome of running one test case. Doubles as the forking runner's
/// child exit-status encoding (`pass=0, fail=1, skipped=2, error=3`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Outcome {
    /// The test case ran to completion with no reported failure.
    Pass = 0,
    /// The test case reported a failure (assertion or signal) and aborted.
    Fail = 1,
    /// The test case was explicitly skipped.
    Skipped = 2,
    /// An infrastructure error prevented the test case from completing
    /// normally (allocation failure, serialization failure, and the like).
    Error = 3,
}

impl Outcome {
    /// Decode an outcome from a forking-runner child exit code. Returns
    /// `None` for any other value.
    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Pass),
            1 => Some(Self::Fail),
            2 => Some(Self::Skipped),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

/// The result of running one test case: an outcome, an optional failure,
/// and independently, optional captured output.
///
/// Invariant: a `Pass` result never carries a failure.
#[derive(Clone, Debug)]
pub struct CaseResult {
    outcome: Outcome,
    failure: Option<Failure>,
    output: Option<Output>,
}

impl CaseResult {
    /// Construct a passing result.
    pub fn pass() -> Self {
        Self {
            outcome: Outcome::Pass,
            failure: None,
            output: None,
        }
    }

    /// Construct a result carrying an outcome and, for any outcome other
    /// than `Pass`, an optional failure.
    pub fn new(outcome: Outcome, failure: Option<Failure>) -> Self {
        let failure = if matches!(outcome, Outcome::Pass) {
            None
        } else {
            failure
        };
        Self {
            outcome,
            failure,
            output: None,
        }
    }

    /// Attach captured output to this result, replacing any previous
    /// output.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    /// The result's outcome.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// The result's failure, if any.
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// The result's captured output, if any.
    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Whether this result contributes to the failure count used by the
    /// top-level dispatch entry points (`fail` and `error` each contribute
    /// one; `pass` and `skipped` contribute none).
    pub fn counts_as_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Fail | Outcome::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::Stage;

    #[test]
    fn pass_never_carries_a_failure() {
        let failure = Failure::new(Stage::Execution, "x", None, None);
        let result = CaseResult::new(Outcome::Pass, Some(failure));
        assert!(result.failure().is_none());
    }

    #[test]
    fn outcome_round_trips_through_exit_code() {
        for outcome in [Outcome::Pass, Outcome::Fail, Outcome::Skipped, Outcome::Error] {
            assert_eq!(Outcome::from_exit_code(outcome as i32), Some(outcome));
        }
        assert_eq!(Outcome::from_exit_code(42), None);
    }
}
