//! The direct runner: executes a test case in-process, using
//! `sigsetjmp`/`siglongjmp` as the non-local-return mechanism instead of a
//! forked child. No isolation -- a case that corrupts process state or
//! crashes the process takes the whole run down with it. Useful under a
//! debugger or profiler, where a forked child would be invisible to the
//! tool attached to the parent.
//!
//! The jump target has four discriminators: normal completion (the
//! `sigsetjmp` call itself returning `0`), a normal short-circuit (the
//! hooks reported a skip or a failure), a caught signal (the signal number
//! is stashed on [`DirectHooks`], never formatted inside the handler
//! itself), and an unexpected OS error arising from something other than
//! the case body (for example, the signal capture installation racing a
//! second installer). Any other jump code is a logic error in this file,
//! not a condition callers need to handle, and is reported the same way
//! the unexpected-errno branch is.

use crate::driver::execute_testcase;
use crate::errors::DriverError;
use crate::failure::Failure;
use crate::hooks::ExecutionHooks;
use crate::output::Output;
use crate::result::{CaseResult, Outcome};
use crate::signal::{self, SignalError};
use crate::suite::{Stage, TestCase};
use camino::Utf8Path;
use nix::unistd::{dup, dup2_stderr, dup2_stdin, dup2_stdout};
use std::io::{Read, Seek, SeekFrom};
use std::os::fd::{AsRawFd, RawFd};
use std::os::raw::c_void;

const JUMP_SHORT_CIRCUIT: i32 = 1;
const JUMP_SIGNAL: i32 = 2;
const JUMP_ERRNO: i32 = 3;

struct DirectHooks {
    env: *mut libc::sigjmp_buf,
    stage: Stage,
    pending: Option<(Outcome, Failure)>,
    signum: i32,
}

impl ExecutionHooks for DirectHooks {
    fn on_stage_change(&mut self, stage: Stage) {
        self.stage = stage;
    }

    fn on_skip(&mut self, failure: Failure) -> ! {
        self.pending = Some((Outcome::Skipped, failure));
        // SAFETY: `env` was initialized by a `sigsetjmp` call still on the
        // stack below this one; this function is only ever reached while
        // that frame is live.
        unsafe { libc::siglongjmp(self.env, JUMP_SHORT_CIRCUIT) }
    }

    fn on_failure(&mut self, failure: Failure) -> ! {
        self.pending = Some((Outcome::Fail, failure));
        unsafe { libc::siglongjmp(self.env, JUMP_SHORT_CIRCUIT) }
    }
}

extern "C" fn signal_trampoline(signum: i32, cookie: *mut c_void) {
    // SAFETY: `cookie` was set to the address of the `DirectHooks` for the
    // case currently executing, which outlives the whole call. No
    // formatting happens here -- only an integer store and a jump, so this
    // handler stays async-signal-safe.
    let hooks = unsafe { &mut *(cookie as *mut DirectHooks) };
    hooks.signum = signum;
    unsafe { libc::siglongjmp(hooks.env, JUMP_SIGNAL) }
}

fn install_signals(hooks: &mut DirectHooks) -> Result<signal::SignalCapture, SignalError> {
    signal::install(signal_trampoline, hooks as *mut DirectHooks as *mut c_void)
}

/// Jump to the unexpected-errno branch from inside the protected region,
/// for a disposition that is fatal but not a caught signal.
fn jump_errno(env: *mut libc::sigjmp_buf) -> ! {
    // SAFETY: same as `on_skip`/`on_failure` -- only reached while the
    // `sigsetjmp` frame that installed `env` is still live.
    unsafe { libc::siglongjmp(env, JUMP_ERRNO) }
}

fn read_and_rewind(file: &mut std::fs::File) -> std::io::Result<Output> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(Output::from_bytes(buf))
}

fn errno_io(err: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(err as i32)
}

/// Run one test case in-process, redirecting its standard streams into an
/// anonymous temp file created under `temp_dir`, returning its result with
/// the captured output attached.
///
/// A case that segfaults, aborts, or otherwise terminates the process does
/// not return through this function at all -- there is no child to
/// isolate the fault to.
pub fn run_case(case: &TestCase, temp_dir: &Utf8Path) -> Result<CaseResult, DriverError> {
    let stdin_saved: RawFd = dup(libc::STDIN_FILENO).map_err(errno_io)?;
    let stdout_saved: RawFd = dup(libc::STDOUT_FILENO).map_err(errno_io)?;
    let stderr_saved: RawFd = dup(libc::STDERR_FILENO).map_err(errno_io)?;

    let devnull = nix::fcntl::open(
        "/dev/null",
        nix::fcntl::OFlag::O_RDONLY,
        nix::sys::stat::Mode::empty(),
    )
    .map_err(errno_io)?;
    let mut output_file = camino_tempfile::tempfile_in(temp_dir)?;
    let output_fd = output_file.as_raw_fd();

    let mut env: libc::sigjmp_buf = unsafe { std::mem::zeroed() };
    let mut hooks = DirectHooks {
        env: &mut env as *mut _,
        stage: Stage::Setup,
        pending: None,
        signum: 0,
    };
    // Holds the installed capture across the jump so it can be restored
    // unconditionally below, regardless of which branch of the match fired.
    // `siglongjmp` bypasses Drop entirely, so a value bound only inside the
    // `0` arm would never be reachable again once a jump leaves it.
    let mut capture_holder: Option<signal::SignalCapture> = None;

    // SAFETY: `env` is valid for the lifetime of this stack frame; every
    // `siglongjmp` reachable from `execute_testcase` targets it.
    let ret = unsafe { libc::sigsetjmp(&mut env as *mut _, 1) };
    let (outcome, failure) = match ret {
        0 => {
            unsafe { libc::fflush(std::ptr::null_mut()) };
            let _ = dup2_stdin(devnull);
            let _ = dup2_stdout(output_fd);
            let _ = dup2_stderr(output_fd);

            match install_signals(&mut hooks) {
                Ok(capture) => {
                    capture_holder = Some(capture);
                    execute_testcase(case, &mut hooks);
                    (Outcome::Pass, None)
                }
                Err(_) => jump_errno(hooks.env),
            }
        }
        JUMP_SHORT_CIRCUIT => {
            let (outcome, failure) = hooks
                .pending
                .take()
                .expect("short circuit without a pending failure");
            (outcome, Some(failure))
        }
        JUMP_SIGNAL => {
            let failure = Failure::new(
                hooks.stage,
                format!("caught unexpected signal {}", hooks.signum),
                None,
                None,
            );
            (Outcome::Fail, Some(failure))
        }
        JUMP_ERRNO => {
            let failure = Failure::new(
                hooks.stage,
                "signal capture could not be installed for this case",
                None,
                None,
            );
            (Outcome::Error, Some(failure))
        }
        code => {
            let failure = Failure::new(
                hooks.stage,
                format!("unexpected return {code} from non-local jump"),
                None,
                None,
            );
            (Outcome::Error, Some(failure))
        }
    };

    if let Some(capture) = capture_holder.take() {
        capture.restore()?;
    }

    unsafe { libc::fflush(std::ptr::null_mut()) };
    let _ = dup2_stdin(stdin_saved);
    let _ = dup2_stdout(stdout_saved);
    let _ = dup2_stderr(stderr_saved);
    let _ = nix::unistd::close(stdin_saved);
    let _ = nix::unistd::close(stdout_saved);
    let _ = nix::unistd::close(stderr_saved);
    let _ = nix::unistd::close(devnull);

    let output = read_and_rewind(&mut output_file)?;
    Ok(CaseResult::new(outcome, failure).with_output(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::TestCase;
    use std::ffi::c_void;

    unsafe extern "C" fn passing_body(_fixture: *mut c_void, _data: *const c_void) {}

    unsafe extern "C" fn printing_body(_fixture: *mut c_void, _data: *const c_void) {
        unsafe {
            libc::printf(c"hello from case\n".as_ptr());
        }
    }

    fn case(caller: unsafe extern "C" fn(*mut c_void, *const c_void)) -> TestCase {
        TestCase {
            name: "t".to_string(),
            test_name: "t".to_string(),
            suite_name: "s".to_string(),
            caller,
            fixture_provider: None,
            data_row: None,
            dynamic_ops_cell: None,
        }
    }

    #[test]
    fn passing_case_returns_pass() {
        let dir = camino_tempfile::tempdir().expect("tempdir");
        let result = run_case(&case(passing_body), dir.path()).expect("run");
        assert_eq!(result.outcome(), Outcome::Pass);
    }

    #[test]
    fn captures_stdout_into_output() {
        let dir = camino_tempfile::tempdir().expect("tempdir");
        let result = run_case(&case(printing_body), dir.path()).expect("run");
        assert_eq!(result.outcome(), Outcome::Pass);
        let output = result.output().expect("output attached");
        let text = String::from_utf8_lossy(output.as_bytes());
        assert!(text.contains("hello from case"));
    }
}
