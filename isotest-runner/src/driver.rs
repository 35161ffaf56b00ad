//! The test-case driver: fixture allocation, setup, body invocation,
//! teardown, and the dynamic-ops hook swap.
//!
//! Neither runner reaches an abort through Rust unwinding. A loaded
//! module's body is an `extern "C"` function this crate does not control
//! the compilation of, so letting a panic cross back through it would rely
//! on unwind-table guarantees this crate cannot verify. Instead, whichever
//! [`crate::hooks::ExecutionHooks`] impl is installed diverges by a means
//! that needs no per-frame unwind metadata at all (`_exit` for the forking
//! runner, `siglongjmp` for the direct runner) -- see each runner module
//! for its implementation. This driver's job is only to make sure that,
//! however the abort is triggered, teardown has run and the dynamic-ops
//! cell has been restored *before* that divergence happens.

use crate::failure::Failure;
use crate::hooks::{AbortKind, DynamicOpsState, ExecutionHooks};
use crate::suite::{RawDynamicOps, Stage, TestCase};
use smallvec::SmallVec;
use std::ffi::c_void;

/// The inline-storage threshold for fixture state: fixtures at or below
/// this size live on the stack; larger ones spill to the heap. `SmallVec`
/// implements exactly this policy, so no manual heap/stack bookkeeping is
/// needed.
pub const INLINE_FIXTURE_BYTES: usize = 128;

struct DriverContext {
    hooks: *mut dyn ExecutionHooks,
    stage: Stage,
    dynops: DynamicOpsState,
    fixture_ptr: *mut c_void,
    teardown_provider: Option<crate::suite::FixtureProvider>,
    dynamic_ops_cell: Option<*mut crate::suite::DynamicOpsCell>,
    old_ops: *const RawDynamicOps,
}

impl DriverContext {
    fn hooks(&mut self) -> &mut dyn ExecutionHooks {
        // SAFETY: `hooks` outlives the driver call by construction --
        // `execute_testcase` never returns this context or lets it escape.
        unsafe { &mut *self.hooks }
    }

    fn run_teardown_if_pending(&mut self) {
        if let Some(provider) = self.teardown_provider.take() {
            self.stage = Stage::Teardown;
            self.hooks().on_stage_change(Stage::Teardown);
            // SAFETY: `fixture_ptr` was sized and zeroed for exactly this
            // provider by `execute_testcase`.
            unsafe { provider.teardown(self.fixture_ptr) };
        }
    }

    fn restore_dynamic_ops(&mut self) {
        if let Some(cell) = self.dynamic_ops_cell {
            // SAFETY: `cell` points at module-owned static storage kept
            // alive by the loaded library for the run's duration.
            unsafe { (*cell).ops = self.old_ops };
        }
    }

    fn report_failure(&mut self, failure: Failure) {
        self.dynops.report_failure(failure);
    }

    /// Reached from the module-facing abort trampoline -- may be called
    /// from inside `setup`, the test body, or `teardown` itself. Runs
    /// whatever of steps 3-5 has not already happened, then diverges.
    fn abort(&mut self, kind: AbortKind) -> ! {
        let effective = self.dynops.abort(kind);
        self.run_teardown_if_pending();
        self.restore_dynamic_ops();
        let failure = self.dynops.take_failure();
        match effective {
            AbortKind::Fail => self.hooks().on_failure(
                failure.unwrap_or_else(|| Failure::new(self.stage, "test aborted", None, None)),
            ),
            AbortKind::Skip => self.hooks().on_skip(
                failure.unwrap_or_else(|| Failure::new(self.stage, "test skipped", None, None)),
            ),
        }
    }
}

unsafe extern "C" fn trampoline_report_failure(self_: *mut c_void, message: *const i8) {
    // SAFETY: `self_` was set by `execute_testcase` to a live `DriverContext`.
    let ctx = unsafe { &mut *(self_ as *mut DriverContext) };
    let description = if message.is_null() {
        String::new()
    } else {
        // SAFETY: the module contract requires a NUL-terminated C string.
        unsafe { std::ffi::CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    };
    ctx.report_failure(Failure::new(ctx.stage, description, None, None));
}

unsafe extern "C" fn trampoline_abort(self_: *mut c_void, kind: u32) -> ! {
    // SAFETY: see `trampoline_report_failure`.
    let ctx = unsafe { &mut *(self_ as *mut DriverContext) };
    let kind = if kind == 1 { AbortKind::Skip } else { AbortKind::Fail };
    ctx.abort(kind)
}

/// Execute one test case to completion.
///
/// Returns normally only if the case passed outright (no failure was ever
/// reported). Every other outcome is delivered by diverging through
/// `hooks`'s `on_failure`/`on_skip` -- callers must not expect this
/// function to return in those cases; the installed hooks implementation
/// is responsible for actually leaving (process exit or `siglongjmp`).
pub fn execute_testcase(case: &TestCase, hooks: &mut dyn ExecutionHooks) {
    hooks.on_stage_change(Stage::Setup);

    let size = case.fixture_provider.map(|p| p.size()).unwrap_or(0);
    let mut fixture_storage: SmallVec<[u8; INLINE_FIXTURE_BYTES]> = SmallVec::from_elem(0, size);
    let fixture_ptr: *mut c_void = if size == 0 {
        std::ptr::null_mut()
    } else {
        fixture_storage.as_mut_ptr() as *mut c_void
    };

    let mut ctx = DriverContext {
        hooks: hooks as *mut dyn ExecutionHooks,
        stage: Stage::Setup,
        dynops: DynamicOpsState::new(),
        fixture_ptr,
        teardown_provider: case.fixture_provider,
        dynamic_ops_cell: case.dynamic_ops_cell,
        old_ops: std::ptr::null(),
    };

    let raw_ops = RawDynamicOps {
        report_failure: trampoline_report_failure,
        abort: trampoline_abort,
        self_: &mut ctx as *mut DriverContext as *mut c_void,
    };

    if let Some(cell) = ctx.dynamic_ops_cell {
        // SAFETY: `cell` refers to module-owned static storage; `raw_ops`
        // outlives every use the module makes of it because it is read
        // only synchronously, within this function's call window.
        unsafe {
            ctx.old_ops = (*cell).ops;
            (*cell).ops = &raw_ops;
        }
    }

    if let Some(provider) = case.fixture_provider {
        // SAFETY: `fixture_ptr` points at `size` zeroed, owned bytes.
        unsafe { provider.setup(fixture_ptr) };
    }

    ctx.stage = Stage::Execution;
    ctx.hooks().on_stage_change(Stage::Execution);
    // SAFETY: the module ABI guarantees `caller` accepts these pointers.
    unsafe {
        (case.caller)(
            fixture_ptr,
            case.data_row.unwrap_or(std::ptr::null()),
        )
    };

    // Normal (non-aborted) path: run teardown, restore, then check for a
    // failure reported during teardown without an explicit abort call.
    ctx.run_teardown_if_pending();
    ctx.restore_dynamic_ops();

    if let Some(failure) = ctx.dynops.take_failure() {
        ctx.hooks().on_failure(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{RawFixtureProvider, Stage};

    struct RecordingHooks {
        stages: Vec<Stage>,
        result: Option<Result<(), (AbortKind, Failure)>>,
    }

    impl ExecutionHooks for RecordingHooks {
        fn on_stage_change(&mut self, stage: Stage) {
            self.stages.push(stage);
        }
        fn on_skip(&mut self, failure: Failure) -> ! {
            self.result = Some(Err((AbortKind::Skip, failure)));
            panic!("test harness stop: skip");
        }
        fn on_failure(&mut self, failure: Failure) -> ! {
            self.result = Some(Err((AbortKind::Fail, failure)));
            panic!("test harness stop: fail");
        }
    }

    unsafe extern "C" fn passing_body(_fixture: *mut c_void, _data: *const c_void) {}

    #[test]
    fn passing_case_announces_all_three_stages_and_returns() {
        let case = TestCase {
            name: "t".to_string(),
            test_name: "t".to_string(),
            suite_name: "s".to_string(),
            caller: passing_body,
            fixture_provider: None,
            data_row: None,
            dynamic_ops_cell: None,
        };
        let mut hooks = RecordingHooks {
            stages: Vec::new(),
            result: None,
        };
        execute_testcase(&case, &mut hooks);
        assert_eq!(
            hooks.stages,
            vec![Stage::Setup, Stage::Execution, Stage::Teardown]
        );
        assert!(hooks.result.is_none());
    }

    static mut SETUP_CALLED: bool = false;
    static mut TEARDOWN_CALLED: bool = false;

    unsafe extern "C" fn fixture_setup(fixture: *mut c_void) {
        unsafe {
            *(fixture as *mut u8) = 7;
            SETUP_CALLED = true;
        }
    }
    unsafe extern "C" fn fixture_teardown(_fixture: *mut c_void) {
        unsafe { TEARDOWN_CALLED = true };
    }
    unsafe extern "C" fn fixture_checking_body(fixture: *mut c_void, _data: *const c_void) {
        assert_eq!(unsafe { *(fixture as *const u8) }, 7);
    }

    #[test]
    fn fixture_setup_and_teardown_run_around_the_body() {
        let provider = RawFixtureProvider {
            setup: Some(fixture_setup),
            teardown: Some(fixture_teardown),
            size: 1,
        };
        let case = TestCase {
            name: "t".to_string(),
            test_name: "t".to_string(),
            suite_name: "s".to_string(),
            caller: fixture_checking_body,
            fixture_provider: Some(crate::suite::FixtureProvider { raw: &provider }),
            data_row: None,
            dynamic_ops_cell: None,
        };
        let mut hooks = RecordingHooks {
            stages: Vec::new(),
            result: None,
        };
        execute_testcase(&case, &mut hooks);
        unsafe {
            assert!(SETUP_CALLED);
            assert!(TEARDOWN_CALLED);
        }
    }
}
