//! The two ways to run a test case: in-process (`direct`) or in a forked
//! child (`forking`), plus the dispatch layer that partitions a suite's
//! cases across whichever kind is configured.

#[cfg(unix)]
pub mod direct;
#[cfg(unix)]
pub mod forking;
pub mod dispatch;

/// Which runner kind executes a test case.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunnerKind {
    /// Execute in-process via `sigsetjmp`/`siglongjmp`. Cheaper, but a
    /// crashing or hanging case takes the whole process down with it.
    Direct,
    /// Execute in a forked child, isolated by a pipe-multiplexed event
    /// channel. The default: one case's crash cannot affect another's.
    Forking,
}

impl Default for RunnerKind {
    fn default() -> Self {
        Self::Forking
    }
}
