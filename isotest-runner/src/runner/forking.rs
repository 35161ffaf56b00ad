//! The forking runner: executes one test case in a freshly forked child,
//! isolated from the parent by a pipe-multiplexed event channel and a
//! separate captured-output channel. The default runner kind: a crash or
//! hang in one case cannot take any other case down with it.

use crate::driver::execute_testcase;
use crate::errors::RunnerError;
use crate::event::{EventConsumer, EventReader, EventWriter};
use crate::failure::Failure;
use crate::hooks::ExecutionHooks;
use crate::output_reader::OutputReader;
use crate::poll::{PollHandler, PollOutcome, Supervisor};
use crate::result::{CaseResult, Outcome};
use crate::suite::{Stage, TestCase};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, fork};
use std::os::fd::{AsRawFd, RawFd};
use std::os::raw::c_void;

struct ForkingHooks {
    writer: EventWriter,
}

impl ExecutionHooks for ForkingHooks {
    fn on_stage_change(&mut self, stage: Stage) {
        let _ = self.writer.write_stage_change(stage);
    }

    fn on_skip(&mut self, failure: Failure) -> ! {
        let _ = self.writer.write_failure(&failure);
        // SAFETY: a process exit needs no unwind metadata; this is the
        // only way out of a stack that may pass through a foreign
        // `extern "C"` frame we cannot unwind through.
        unsafe { libc::_exit(Outcome::Skipped as i32) }
    }

    fn on_failure(&mut self, failure: Failure) -> ! {
        let _ = self.writer.write_failure(&failure);
        unsafe { libc::_exit(Outcome::Fail as i32) }
    }
}

extern "C" fn signal_trampoline(signum: i32, cookie: *mut c_void) {
    // SAFETY: `cookie` points at the `ForkingHooks` for the case currently
    // executing in this child, which is never moved or dropped early.
    let hooks = unsafe { &mut *(cookie as *mut ForkingHooks) };
    hooks.on_failure(Failure::new(
        Stage::Execution,
        format!("terminated by signal {signum}"),
        None,
        None,
    ));
}

fn child_main(case: &TestCase, event_write: RawFd, output_write: RawFd) -> ! {
    if let Ok(devnull) = nix::fcntl::open(
        "/dev/null",
        nix::fcntl::OFlag::O_RDONLY,
        nix::sys::stat::Mode::empty(),
    ) {
        let _ = nix::unistd::dup2_stdin(devnull.as_raw_fd());
    }
    let _ = nix::unistd::dup2_stdout(output_write);
    let _ = nix::unistd::dup2_stderr(output_write);

    let mut hooks = ForkingHooks {
        writer: EventWriter::new(event_write),
    };
    let cookie = &mut hooks as *mut ForkingHooks as *mut c_void;
    if crate::signal::install(signal_trampoline, cookie).is_err() {
        unsafe { libc::_exit(Outcome::Error as i32) };
    }

    execute_testcase(case, &mut hooks);
    unsafe { libc::_exit(Outcome::Pass as i32) }
}

#[derive(Default)]
struct Collector {
    failure: Option<Failure>,
}

impl EventConsumer for Collector {
    fn on_stage_change(&mut self, _stage: Stage) {}

    fn on_failure(&mut self, failure: Failure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

enum Handler {
    Event(EventReader<Collector>),
    Output(OutputReader),
}

impl PollHandler for Handler {
    fn fd(&self) -> RawFd {
        match self {
            Handler::Event(h) => h.fd(),
            Handler::Output(h) => h.fd(),
        }
    }

    fn on_data_available(&mut self) -> PollOutcome {
        match self {
            Handler::Event(h) => h.on_data_available(),
            Handler::Output(h) => h.on_data_available(),
        }
    }

    fn on_close(&mut self) {
        match self {
            Handler::Event(h) => h.on_close(),
            Handler::Output(h) => h.on_close(),
        }
    }
}

fn infra_error(testcase: &str, source: std::io::Error) -> RunnerError {
    RunnerError::Infrastructure {
        testcase: testcase.to_string(),
        source,
    }
}

fn errno_io(errno: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno as i32)
}

/// Run one test case in a forked child, returning its result.
pub fn run_case(case: &TestCase) -> Result<CaseResult, RunnerError> {
    let (event_read, event_write) =
        nix::unistd::pipe().map_err(|e| infra_error(&case.name, errno_io(e)))?;
    let (output_read, output_write) =
        nix::unistd::pipe().map_err(|e| infra_error(&case.name, errno_io(e)))?;

    // SAFETY: the child only performs async-signal-safe work (dup2, our
    // own handler installation, the module's own code) before calling
    // `_exit`; it never returns through this function.
    match unsafe { fork() }.map_err(|e| infra_error(&case.name, errno_io(e)))? {
        ForkResult::Child => {
            drop(event_read);
            drop(output_read);
            child_main(case, event_write.as_raw_fd(), output_write.as_raw_fd());
        }
        ForkResult::Parent { child } => {
            drop(event_write);
            drop(output_write);

            let mut supervisor = Supervisor::new(vec![
                Handler::Event(EventReader::new(
                    event_read.as_raw_fd(),
                    Collector::default(),
                )),
                Handler::Output(OutputReader::new(output_read.as_raw_fd())),
            ]);
            if let Err(e) = supervisor.run() {
                // A read failed mid-stream; the child may be stuck rather
                // than finished. Force it down before reaping so `waitpid`
                // cannot block forever.
                let _ = nix::sys::signal::kill(child, nix::sys::signal::Signal::SIGKILL);
                let _ = waitpid(child, None);
                return Err(infra_error(&case.name, e));
            }

            let status =
                waitpid(child, None).map_err(|e| infra_error(&case.name, errno_io(e)))?;

            let mut handlers = supervisor.into_handlers();
            let output_handler = handlers.pop().unwrap();
            let event_handler = handlers.pop().unwrap();
            let mut failure = match event_handler {
                Handler::Event(reader) => reader.into_consumer().failure,
                Handler::Output(_) => unreachable!(),
            };
            let output = match output_handler {
                Handler::Output(mut reader) => reader.build(),
                Handler::Event(_) => unreachable!(),
            };

            // A failure collected over the event channel always describes
            // what actually happened; these are fallbacks for the case
            // where the child never got to write one (killed by an
            // uncatchable signal, or exited with a code we don't own).
            let outcome = match status {
                WaitStatus::Exited(_, code) => match Outcome::from_exit_code(code) {
                    Some(outcome) => outcome,
                    None => {
                        failure.get_or_insert_with(|| {
                            Failure::new(
                                Stage::Execution,
                                format!("child exited with code {code}"),
                                None,
                                None,
                            )
                        });
                        Outcome::Error
                    }
                },
                WaitStatus::Signaled(_, signal, _) => {
                    failure.get_or_insert_with(|| {
                        Failure::new(
                            Stage::Execution,
                            format!("child killed by signal {signal}"),
                            None,
                            None,
                        )
                    });
                    Outcome::Error
                }
                _ => Outcome::Error,
            };

            let mut result = CaseResult::new(outcome, failure);
            if let Some(output) = output {
                result = result.with_output(output);
            }
            Ok(result)
        }
    }
}
