//! A minimal console reporter implementing the engine's reporter port:
//! one line per test case, `PASS`/`FAIL`/`SKIP`/`ERROR` prefixed.

use isotest_runner::result::{CaseResult, Outcome};
use isotest_runner::reporter::{Reporter, SuiteReporter, TestCaseReporter, TestReporter};

fn label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Pass => "PASS",
        Outcome::Fail => "FAIL",
        Outcome::Skipped => "SKIP",
        Outcome::Error => "ERROR",
    }
}

/// The top-level text reporter. Holds no state beyond a display prefix;
/// every suite/test/case reporter it mints just writes to stdout.
#[derive(Default)]
pub struct TextReporter;

struct TextSuiteReporter<'a> {
    #[allow(dead_code)]
    reporter: &'a mut TextReporter,
    suite_name: String,
}

struct TextTestReporter {
    suite_name: String,
    test_name: String,
}

struct TextCaseReporter {
    suite_name: String,
    test_name: String,
    name: String,
    destroyed_without_complete: bool,
}

impl Reporter for TextReporter {
    fn open_suite(&mut self, name: &str) -> Box<dyn SuiteReporter + '_> {
        Box::new(TextSuiteReporter {
            reporter: self,
            suite_name: name.to_string(),
        })
    }
}

impl SuiteReporter for TextSuiteReporter<'_> {
    fn open_test(&mut self, name: &str) -> Box<dyn TestReporter + '_> {
        Box::new(TextTestReporter {
            suite_name: self.suite_name.clone(),
            test_name: name.to_string(),
        })
    }
}

impl TestReporter for TextTestReporter {
    fn open_case(&mut self, name: &str) -> Box<dyn TestCaseReporter + '_> {
        Box::new(TextCaseReporter {
            suite_name: self.suite_name.clone(),
            test_name: self.test_name.clone(),
            name: name.to_string(),
            destroyed_without_complete: true,
        })
    }
}

impl TestCaseReporter for TextCaseReporter {
    fn start(&mut self, _name: &str) {}

    fn complete(&mut self, result: CaseResult) {
        self.destroyed_without_complete = false;
        println!(
            "{:<6} {}:{}:{}",
            label(result.outcome()),
            self.suite_name,
            self.test_name,
            self.name
        );
        if let Some(failure) = result.failure() {
            println!("       {}", failure.description);
            if let Some(location) = &failure.location {
                let filename = location.filename.as_deref().unwrap_or("<unknown>");
                println!("       at {filename}:{}", location.line);
            }
        }
    }
}

impl Drop for TextCaseReporter {
    fn drop(&mut self) {
        if self.destroyed_without_complete {
            println!(
                "CANCEL {}:{}:{}",
                self.suite_name, self.test_name, self.name
            );
        }
    }
}
