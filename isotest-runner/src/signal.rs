//! Process-wide signal capture.
//!
//! Installs a single handler for every catchable terminal or job-control
//! signal, routing delivery to one registered callback plus an opaque
//! cookie. Installation and restoration both block all signals for the
//! duration of the call so the global handler table is manipulated
//! atomically with respect to delivery, and only one handler+cookie pair
//! may be active at a time.

use crate::errors::SignalError;
use nix::sys::signal::{SigAction, SigHandler, SigSet, Signal, sigaction, sigprocmask};
use nix::sys::signal::SigmaskHow;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// The callback a handler is routed to. `signum` is the raw signal number;
/// `cookie` is whatever was passed to [`install`].
pub type SignalCallback = unsafe extern "C" fn(signum: i32, cookie: *mut c_void);

/// Every catchable terminal or job-control signal this facility installs a
/// handler for. `SIGKILL` and `SIGSTOP` are excluded because the platform
/// does not allow catching them.
pub const SIGNALS: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGFPE,
    Signal::SIGSEGV,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

static ACTIVE: AtomicBool = AtomicBool::new(false);
static CALLBACK: AtomicPtr<()> = AtomicPtr::new(std::ptr::null_mut());
static COOKIE: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
// Serializes install/restore against each other; `ACTIVE` alone guards
// against a *second concurrent installation*, this mutex just keeps the
// save/restore bookkeeping single-threaded.
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

extern "C" fn trampoline(signum: c_int) {
    let cb = CALLBACK.load(Ordering::SeqCst);
    if cb.is_null() {
        return;
    }
    // SAFETY: `cb` was stored from a `SignalCallback` in `install` and is
    // only ever cleared (to null) under `INSTALL_LOCK` in `restore`, which
    // cannot race a signal delivery that reads it first.
    let cb: SignalCallback = unsafe { std::mem::transmute::<*mut (), SignalCallback>(cb) };
    let cookie = COOKIE.load(Ordering::SeqCst);
    unsafe { cb(signum, cookie) };
}

/// A handle to an active signal capture installation. Dropping it without
/// calling [`SignalCapture::restore`] leaves the handlers installed --
/// callers must call `restore` explicitly on every exit path.
pub struct SignalCapture {
    saved: Vec<(Signal, SigAction)>,
}

fn block_all_signals() -> Result<SigSet, SignalError> {
    let all = SigSet::all();
    let mut old = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&all), Some(&mut old)).map_err(|errno| {
        SignalError::Syscall {
            signal: 0,
            source: std::io::Error::from_raw_os_error(errno as i32),
        }
    })?;
    Ok(old)
}

fn restore_mask(old: SigSet) -> Result<(), SignalError> {
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&old), None).map_err(|errno| SignalError::Syscall {
        signal: 0,
        source: std::io::Error::from_raw_os_error(errno as i32),
    })
}

/// Install the uniform handler for every signal in [`SIGNALS`], routing
/// delivery to `callback` with `cookie`. Fails fast with
/// [`SignalError::AlreadyInstalled`] if a handler is already active.
pub fn install(callback: SignalCallback, cookie: *mut c_void) -> Result<SignalCapture, SignalError> {
    let _guard = INSTALL_LOCK.lock().unwrap();
    if ACTIVE.swap(true, Ordering::SeqCst) {
        return Err(SignalError::AlreadyInstalled);
    }

    CALLBACK.store(callback as *mut (), Ordering::SeqCst);
    COOKIE.store(cookie, Ordering::SeqCst);

    let old_mask = match block_all_signals() {
        Ok(old) => old,
        Err(e) => {
            ACTIVE.store(false, Ordering::SeqCst);
            return Err(e);
        }
    };

    let action = unsafe {
        SigAction::new(SigHandler::Handler(trampoline), nix::sys::signal::SaFlags::empty(), SigSet::all())
    };

    let mut saved = Vec::with_capacity(SIGNALS.len());
    for &sig in SIGNALS {
        match unsafe { sigaction(sig, &action) } {
            Ok(prev) => saved.push((sig, prev)),
            Err(errno) => {
                for (s, prev) in saved.iter() {
                    let _ = unsafe { sigaction(*s, prev) };
                }
                let _ = restore_mask(old_mask);
                CALLBACK.store(std::ptr::null_mut(), Ordering::SeqCst);
                ACTIVE.store(false, Ordering::SeqCst);
                return Err(SignalError::Syscall {
                    signal: sig as i32,
                    source: std::io::Error::from_raw_os_error(errno as i32),
                });
            }
        }
    }

    restore_mask(old_mask)?;
    Ok(SignalCapture { saved })
}

impl SignalCapture {
    /// Restore every signal's prior disposition, in the order it was
    /// saved, and clear the active handler/cookie.
    pub fn restore(self) -> Result<(), SignalError> {
        let _guard = INSTALL_LOCK.lock().unwrap();
        let old_mask = block_all_signals()?;
        for (sig, prev) in &self.saved {
            unsafe { sigaction(*sig, prev) }.map_err(|errno| SignalError::Syscall {
                signal: *sig as i32,
                source: std::io::Error::from_raw_os_error(errno as i32),
            })?;
        }
        restore_mask(old_mask)?;
        CALLBACK.store(std::ptr::null_mut(), Ordering::SeqCst);
        COOKIE.store(std::ptr::null_mut(), Ordering::SeqCst);
        ACTIVE.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

    unsafe extern "C" fn record(signum: i32, _cookie: *mut c_void) {
        LAST_SIGNAL.store(signum, Ordering::SeqCst);
    }

    // `ACTIVE` is process-global, so both assertions live in one test --
    // running them as separate `#[test]`s would race against cargo test's
    // parallel harness.
    #[test]
    fn install_lifecycle() {
        let capture = install(record, std::ptr::null_mut()).expect("install");
        let err = install(record, std::ptr::null_mut());
        assert!(matches!(err, Err(SignalError::AlreadyInstalled)));
        capture.restore().expect("restore");

        // A second install must succeed now that the first was restored.
        let capture = install(record, std::ptr::null_mut()).expect("reinstall");
        capture.restore().expect("restore again");
    }
}
