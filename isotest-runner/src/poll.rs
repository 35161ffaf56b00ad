//! The poll handler port and the blocking supervisor multiplexer built on
//! top of it.
//!
//! Build a pollset from the open descriptors, wait for readiness, dispatch
//! `on_data_available`/`on_close`, and loop until every descriptor has
//! closed.

use std::os::fd::RawFd;

/// The result of one `on_data_available` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    /// The handler consumed this many bytes and remains open.
    Consumed(usize),
    /// End of stream: the descriptor should be considered closed.
    Eof,
    /// An I/O error occurred reading this descriptor.
    Error,
}

/// A poll handler multiplexed by [`Supervisor`]. Each registered descriptor
/// carries exactly one handler.
pub trait PollHandler {
    /// The descriptor this handler reads from.
    fn fd(&self) -> RawFd;

    /// Called when the descriptor is readable. Implementations read
    /// whatever is available (non-blocking is not required; the
    /// descriptors used here are blocking pipes and a single `read` is
    /// always safe once `poll` reports readiness).
    fn on_data_available(&mut self) -> PollOutcome;

    /// Called exactly once, when the descriptor is determined to be
    /// closed (by `on_data_available` returning `Eof`/`Error`, or by the
    /// poll event signalling hangup).
    fn on_close(&mut self);
}

/// Multiplexes a fixed set of poll handlers until all have closed.
///
/// The loop: build a pollset from the still-open handlers; if none remain,
/// stop; wait for readiness; for each ready descriptor invoke
/// `on_data_available`; a zero/negative result or a hangup event marks the
/// descriptor closed and triggers exactly one `on_close` call. Closed
/// handlers are kept (not dropped) so callers can recover what they
/// accumulated via [`Supervisor::into_handlers`].
pub struct Supervisor<H: PollHandler> {
    handlers: Vec<H>,
    open: Vec<bool>,
}

impl<H: PollHandler> Supervisor<H> {
    /// Build a supervisor over the given handlers.
    pub fn new(handlers: Vec<H>) -> Self {
        let open = vec![true; handlers.len()];
        Self { handlers, open }
    }

    /// Consume the supervisor, returning its handlers in their final state.
    pub fn into_handlers(self) -> Vec<H> {
        self.handlers
    }

    /// Run the multiplexer until every handler has closed.
    #[cfg(unix)]
    pub fn run(&mut self) -> std::io::Result<()> {
        use nix::poll::{PollFd, PollFlags, PollTimeout};
        use std::os::fd::BorrowedFd;

        loop {
            let open_indices: Vec<usize> = self
                .open
                .iter()
                .enumerate()
                .filter_map(|(i, &open)| open.then_some(i))
                .collect();
            if open_indices.is_empty() {
                return Ok(());
            }

            let fds: Vec<RawFd> = open_indices.iter().map(|&i| self.handlers[i].fd()).collect();
            let mut pollfds: Vec<PollFd> = fds
                .iter()
                .map(|&fd| {
                    // SAFETY: the fd is kept open by the owning handler for
                    // at least as long as this poll call.
                    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
                    PollFd::new(borrowed, PollFlags::POLLIN)
                })
                .collect();

            nix::poll::poll(&mut pollfds, PollTimeout::NONE)
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

            for (slot, pollfd) in open_indices.iter().zip(pollfds.iter()) {
                let revents = pollfd.revents().unwrap_or(PollFlags::empty());
                if revents.is_empty() {
                    continue;
                }
                let hangup = revents.contains(PollFlags::POLLHUP)
                    || revents.contains(PollFlags::POLLERR);
                let handler = &mut self.handlers[*slot];
                let outcome = if revents.contains(PollFlags::POLLIN) {
                    handler.on_data_available()
                } else {
                    PollOutcome::Eof
                };
                let closed = hangup
                    || matches!(outcome, PollOutcome::Eof)
                    || matches!(outcome, PollOutcome::Error);
                if closed {
                    self.open[*slot] = false;
                    self.handlers[*slot].on_close();
                }
            }
        }
    }
}
