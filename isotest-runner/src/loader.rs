//! Loading a dynamic test module: resolving the well-known suite symbol
//! and validating its manifest ABI.
//!
//! This is deliberately a thin loader: it validates magic, version, and
//! symbol presence, and materializes the owned [`Suite`]/[`Test`]/
//! [`TestCase`] tree from the raw manifest. It does not dispatch any test
//! execution itself -- that is [`crate::driver::execute_testcase`]'s job.

use crate::errors::LoaderError;
use crate::suite::{
    DataProvider, DynamicOpsCell, FixtureProvider, RawSuite, RawTest, Suite, Test, TestCase,
    SUITE_ABI_VERSION, SUITE_MAGIC,
};
use camino::{Utf8Path, Utf8PathBuf};
use libloading::{Library, Symbol};
use std::ffi::CStr;
use std::sync::Arc;

/// The well-known symbol name a module exports its suite manifest at.
pub const SUITE_SYMBOL: &[u8] = b"ctest_suite\0";

/// The well-known symbol name a module may export its dynamic-ops cell at.
/// Its absence is not an error: the module simply cannot report failures
/// through the dynamic-ops mechanism (assertions compiled into a fixture's
/// `setup`/`teardown` can still call `report_failure`/`abort` directly if
/// the module never installs its own cell, but most modules export one).
pub const DYNAMIC_OPS_SYMBOL: &[u8] = b"ctest_dynamic_ops\0";

unsafe fn c_str_to_string(ptr: *const i8) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: the module ABI requires every name field to be a
    // NUL-terminated C string for the library's lifetime.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Load a suite from the dynamic module at `path`.
pub fn load_suite(path: &Utf8Path) -> Result<Suite, LoaderError> {
    // SAFETY: loading and running a third-party module's static
    // initializers is inherently unsafe; this crate's whole purpose is to
    // host exactly that.
    let library =
        unsafe { Library::new(path.as_std_path()) }.map_err(|source| LoaderError::Load {
            path: path.to_owned(),
            source,
        })?;

    let raw_suite: *const RawSuite = unsafe {
        let symbol: Symbol<*const RawSuite> =
            library
                .get(SUITE_SYMBOL)
                .map_err(|source| LoaderError::MissingSuiteSymbol {
                    path: path.to_owned(),
                    source,
                })?;
        *symbol
    };

    let suite_ref = unsafe { &*raw_suite };
    if suite_ref.magic != SUITE_MAGIC {
        return Err(LoaderError::BadMagic {
            path: path.to_owned(),
            found: suite_ref.magic,
            expected: SUITE_MAGIC,
        });
    }
    if suite_ref.version != SUITE_ABI_VERSION {
        return Err(LoaderError::BadVersion {
            path: path.to_owned(),
            found: suite_ref.version,
            expected: SUITE_ABI_VERSION,
        });
    }

    let dynamic_ops_cell: Option<*mut DynamicOpsCell> = unsafe {
        library
            .get::<*mut DynamicOpsCell>(DYNAMIC_OPS_SYMBOL)
            .ok()
            .map(|symbol| *symbol)
    };

    let suite_name = unsafe { c_str_to_string(suite_ref.name) };
    let raw_tests: &[*const RawTest] =
        unsafe { std::slice::from_raw_parts(suite_ref.tests, suite_ref.test_count) };

    let mut tests = Vec::with_capacity(raw_tests.len());
    for &raw_test_ptr in raw_tests {
        let raw_test = unsafe { &*raw_test_ptr };
        let test_name = unsafe { c_str_to_string(raw_test.name) };

        let fixture_provider = if raw_test.fixture_provider.is_null() {
            None
        } else {
            Some(FixtureProvider {
                raw: raw_test.fixture_provider,
            })
        };

        let data_provider = if raw_test.data_provider.is_null() {
            None
        } else {
            Some(DataProvider {
                raw: raw_test.data_provider,
            })
        };

        let cases = match data_provider {
            None => vec![TestCase {
                name: test_name.clone(),
                test_name: test_name.clone(),
                suite_name: suite_name.clone(),
                caller: raw_test.caller,
                fixture_provider,
                data_row: None,
                dynamic_ops_cell,
            }],
            Some(provider) => (0..provider.count())
                .map(|i| {
                    let row = provider.row(i);
                    let display = provider
                        .render_row(i)
                        .unwrap_or_else(|| i.to_string());
                    TestCase {
                        name: format!("{test_name}[{display}]"),
                        test_name: test_name.clone(),
                        suite_name: suite_name.clone(),
                        caller: raw_test.caller,
                        fixture_provider,
                        data_row: Some(row),
                        dynamic_ops_cell,
                    }
                })
                .collect(),
        };

        tests.push(Test {
            name: test_name,
            suite_name: suite_name.clone(),
            cases,
        });
    }

    Ok(Suite {
        name: suite_name,
        tests,
        _library: Some(Arc::new(library)),
        module_path: path.to_owned(),
    })
}

/// Load every suite across `paths`, in order. The first module that fails
/// to load aborts the whole load.
pub fn load_suites(paths: &[Utf8PathBuf]) -> Result<Vec<Suite>, LoaderError> {
    paths.iter().map(|path| load_suite(path)).collect()
}
