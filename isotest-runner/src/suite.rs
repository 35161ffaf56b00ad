//! The data model for loaded suites, tests, and test cases, plus the
//! `#[repr(C)]` manifest ABI a dynamic module must export.
//!
//! A suite owns its tests; a test owns its test cases. Destroying a
//! [`Suite`] destroys everything transitively reachable from it.

use camino::Utf8PathBuf;
use std::ffi::c_void;
use std::sync::Arc;

/// The phase a test case is currently executing, as reported through
/// [`crate::hooks::ExecutionHooks::on_stage_change`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum Stage {
    /// Fixture allocation and the test's `setup` callback.
    Setup = 0,
    /// The test body itself.
    Execution = 1,
    /// The test's `teardown` callback.
    Teardown = 2,
}

/// The magic constant every suite manifest must carry.
pub const SUITE_MAGIC: u32 = 0x0072_db2d;
/// The only ABI version this crate understands.
pub const SUITE_ABI_VERSION: u32 = 0;

/// Raw, C-ABI-compatible fixture provider exported by a module.
///
/// `setup` and `teardown` are `NULL` when absent. Both receive a pointer to
/// `size` bytes of zeroed fixture storage.
#[repr(C)]
pub struct RawFixtureProvider {
    /// Populate the fixture. May be null.
    pub setup: Option<unsafe extern "C" fn(fixture: *mut c_void)>,
    /// Tear down the fixture. May be null.
    pub teardown: Option<unsafe extern "C" fn(fixture: *mut c_void)>,
    /// The byte size of the fixture's private state.
    pub size: usize,
}

/// Raw, C-ABI-compatible data provider exported by a module.
///
/// `to_string` called with a zero-length buffer returns the number of bytes
/// required to render the row, excluding any terminator.
#[repr(C)]
pub struct RawDataProvider {
    /// Pointer to a contiguous array of `count` rows, each `row_size` bytes.
    pub rows: *const c_void,
    /// The number of rows in the array.
    pub count: usize,
    /// The byte size of one row.
    pub row_size: usize,
    /// Render one row into `buf` (capacity `len`); returns the number of
    /// bytes required, or a negative value on error.
    pub to_string:
        Option<unsafe extern "C" fn(buf: *mut i8, len: usize, row: *const c_void) -> i32>,
}

/// Raw, C-ABI-compatible per-test definition exported by a module.
#[repr(C)]
pub struct RawTest {
    /// The test's name, as a NUL-terminated C string.
    pub name: *const i8,
    /// The test body. Receives the (possibly-null) fixture pointer and the
    /// (possibly-null) current data row.
    pub caller: unsafe extern "C" fn(fixture: *mut c_void, data_row: *const c_void),
    /// Optional fixture provider; null if the test uses no fixture.
    pub fixture_provider: *const RawFixtureProvider,
    /// Optional data provider; null if the test is not data-driven.
    pub data_provider: *const RawDataProvider,
}

/// Raw, C-ABI-compatible suite manifest exported by a module at a
/// well-known symbol name (see [`crate::loader::SUITE_SYMBOL`]).
#[repr(C)]
pub struct RawSuite {
    /// Must equal [`SUITE_MAGIC`].
    pub magic: u32,
    /// Must equal [`SUITE_ABI_VERSION`].
    pub version: u32,
    /// The suite's name, as a NUL-terminated C string.
    pub name: *const i8,
    /// Pointer to a contiguous array of `test_count` [`RawTest`] pointers.
    pub tests: *const *const RawTest,
    /// The number of tests in the suite.
    pub test_count: usize,
}

/// The dynamic-ops pointer cell a module may export so its assertion
/// primitives can call back into the framework.
#[repr(C)]
pub struct DynamicOpsCell {
    /// The currently-installed implementation, or null if none.
    pub ops: *const RawDynamicOps,
}

/// The C-ABI vtable the driver installs into a module's [`DynamicOpsCell`]
/// for the duration of one test-case execution. `self_` is an opaque
/// pointer to the driver's own per-case state; a module's assertion
/// primitives pass it back unexamined.
#[repr(C)]
pub struct RawDynamicOps {
    /// Record a failure (first-failure-wins; never aborts by itself).
    pub report_failure: unsafe extern "C" fn(self_: *mut c_void, message: *const i8),
    /// Trigger an abort (`0 = fail`, `1 = skip`). Never returns.
    pub abort: unsafe extern "C" fn(self_: *mut c_void, kind: u32) -> !,
    /// Opaque state passed back to `report_failure`/`abort`.
    pub self_: *mut c_void,
}

/// A fixture provider, safe to hold across an `.await`-free synchronous
/// driver invocation because it only ever borrows from a loaded module for
/// the lifetime of the run.
#[derive(Clone, Copy)]
pub struct FixtureProvider {
    pub(crate) raw: *const RawFixtureProvider,
}

// SAFETY: the raw pointer refers to static data owned by the loaded
// `libloading::Library`, which this crate keeps alive for the duration of
// the run.
unsafe impl Send for FixtureProvider {}
unsafe impl Sync for FixtureProvider {}

impl FixtureProvider {
    /// The byte size of the fixture's private state.
    pub fn size(&self) -> usize {
        unsafe { (*self.raw).size }
    }

    /// Run the `setup` callback, if present.
    ///
    /// # Safety
    /// `fixture` must point to at least [`Self::size`] writable bytes.
    pub unsafe fn setup(&self, fixture: *mut c_void) {
        if let Some(setup) = unsafe { (*self.raw).setup } {
            unsafe { setup(fixture) };
        }
    }

    /// Run the `teardown` callback, if present.
    ///
    /// # Safety
    /// `fixture` must point to at least [`Self::size`] bytes previously
    /// passed to [`Self::setup`].
    pub unsafe fn teardown(&self, fixture: *mut c_void) {
        if let Some(teardown) = unsafe { (*self.raw).teardown } {
            unsafe { teardown(fixture) };
        }
    }
}

/// A data provider, borrowed from a loaded module for the run's lifetime.
#[derive(Clone, Copy)]
pub struct DataProvider {
    pub(crate) raw: *const RawDataProvider,
}

unsafe impl Send for DataProvider {}
unsafe impl Sync for DataProvider {}

impl DataProvider {
    /// The number of rows.
    pub fn count(&self) -> usize {
        unsafe { (*self.raw).count }
    }

    /// A pointer to row `index`, or null if out of range.
    pub fn row(&self, index: usize) -> *const c_void {
        let raw = unsafe { &*self.raw };
        if index >= raw.count {
            return std::ptr::null();
        }
        unsafe { raw.rows.add(index * raw.row_size) }
    }

    /// Render row `index` into a display string, `<test-name>[<row>]`.
    pub fn render_row(&self, index: usize) -> Option<String> {
        let raw = unsafe { &*self.raw };
        let to_string = raw.to_string?;
        let row = self.row(index);
        if row.is_null() {
            return None;
        }
        let needed = unsafe { to_string(std::ptr::null_mut(), 0, row) };
        if needed < 0 {
            return None;
        }
        let mut buf = vec![0_i8; needed as usize + 1];
        let written = unsafe { to_string(buf.as_mut_ptr(), buf.len(), row) };
        if written < 0 {
            return None;
        }
        let bytes: Vec<u8> = buf[..written as usize]
            .iter()
            .map(|&b| b as u8)
            .collect();
        String::from_utf8(bytes).ok()
    }
}

/// One test case: a test body applied to at most one input row, with at
/// most one fixture.
#[derive(Clone)]
pub struct TestCase {
    /// Display name: `<test-name>` or `<test-name>[<row-rendering>]`.
    pub name: String,
    /// The owning test's name.
    pub test_name: String,
    /// The owning test's owning suite's name.
    pub suite_name: String,
    pub(crate) caller: unsafe extern "C" fn(fixture: *mut c_void, data_row: *const c_void),
    pub(crate) fixture_provider: Option<FixtureProvider>,
    pub(crate) data_row: Option<*const c_void>,
    /// The module's dynamic-ops cell, if it exports one. Shared by every
    /// case in the owning suite; the driver swaps its contents for the
    /// duration of each case's execution and restores it afterward.
    pub(crate) dynamic_ops_cell: Option<*mut DynamicOpsCell>,
}

unsafe impl Send for TestCase {}
unsafe impl Sync for TestCase {}

impl crate::partition::Partitionable for TestCase {
    fn test_key(&self) -> &str {
        &self.test_name
    }

    fn suite_key(&self) -> &str {
        &self.suite_name
    }
}

/// A named, parameterized test body; owns its test cases.
pub struct Test {
    /// The test's name.
    pub name: String,
    /// The owning suite's name.
    pub suite_name: String,
    /// The test's materialized test cases (one per data row, or exactly
    /// one if the test is not data-driven).
    pub cases: Vec<TestCase>,
}

/// A named collection of tests; the unit of module loading.
pub struct Suite {
    /// The suite's name.
    pub name: String,
    /// The suite's tests, in manifest order.
    pub tests: Vec<Test>,
    // Keeps the dynamic library (and therefore everything `Test`/`TestCase`
    // borrow from it) alive for as long as the suite is held.
    pub(crate) _library: Option<Arc<libloading::Library>>,
    pub(crate) module_path: Utf8PathBuf,
}

impl Suite {
    /// The path the suite was loaded from.
    pub fn module_path(&self) -> &camino::Utf8Path {
        &self.module_path
    }

    /// All test cases across all tests, in manifest order.
    pub fn all_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter().flat_map(|t| t.cases.iter())
    }
}
