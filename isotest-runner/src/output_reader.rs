//! A poll handler that grows an [`Output`] buffer from pipe reads.
//!
//! Initial capacity 128 bytes, doubling growth, and drain-and-drop
//! degradation into a fixed scratch window once an explicit capacity
//! ceiling is reached (see `DESIGN.md`) rather than growing without bound.

use crate::output::Output;
use crate::poll::{PollHandler, PollOutcome};
use std::os::fd::RawFd;

const INITIAL_CAPACITY: usize = 128;
const SCRATCH_SIZE: usize = 4096;
/// Above this size, stop growing the real buffer and drain-and-drop
/// instead, so a runaway test body cannot exhaust memory.
const MAX_CAPACITY: usize = 64 * 1024 * 1024;

/// Reads a pipe's output into a growable buffer.
pub struct OutputReader {
    fd: RawFd,
    buf: Vec<u8>,
    len: usize,
    draining: bool,
    saw_any_bytes: bool,
}

impl OutputReader {
    /// Build a reader over `fd`, which must be open for reading.
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            buf: Vec::new(),
            len: 0,
            draining: false,
            saw_any_bytes: false,
        }
    }

    fn ensure_capacity(&mut self, want: usize) {
        if self.buf.len() >= want {
            return;
        }
        let mut new_cap = self.buf.len().max(INITIAL_CAPACITY);
        while new_cap < want {
            new_cap *= 2;
        }
        if new_cap > MAX_CAPACITY {
            self.draining = true;
            return;
        }
        self.buf.resize(new_cap, 0);
    }

    fn read_into(buf: &mut [u8], fd: RawFd) -> PollOutcome {
        #[cfg(unix)]
        {
            use nix::unistd::read;
            use std::os::fd::BorrowedFd;
            // SAFETY: `fd` is owned by this reader for its entire lifetime.
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            match read(&borrowed, buf) {
                Ok(0) => PollOutcome::Eof,
                Ok(n) => PollOutcome::Consumed(n),
                Err(_) => PollOutcome::Error,
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (buf, fd);
            PollOutcome::Error
        }
    }

    /// Null-terminate and hand off the collected bytes, resetting internal
    /// state. Returns `None` if no bytes were ever read.
    pub fn build(&mut self) -> Option<Output> {
        if !self.saw_any_bytes {
            return None;
        }
        let mut data = std::mem::take(&mut self.buf);
        data.truncate(self.len);
        data.push(0);
        self.len = 0;
        self.saw_any_bytes = false;
        Some(Output::from_bytes(data))
    }
}

impl PollHandler for OutputReader {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn on_data_available(&mut self) -> PollOutcome {
        if self.draining {
            let mut scratch = [0_u8; SCRATCH_SIZE];
            return match Self::read_into(&mut scratch, self.fd) {
                PollOutcome::Consumed(n) => {
                    self.saw_any_bytes = self.saw_any_bytes || n > 0;
                    PollOutcome::Consumed(n)
                }
                other => other,
            };
        }

        self.ensure_capacity(self.len + 1);
        if self.draining {
            return self.on_data_available();
        }
        let outcome = Self::read_into(&mut self.buf[self.len..], self.fd);
        if let PollOutcome::Consumed(n) = outcome {
            self.len += n;
            self.saw_any_bytes = self.saw_any_bytes || n > 0;
        }
        outcome
    }

    fn on_close(&mut self) {}
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reader_with_no_bytes_yields_no_output() {
        let mut reader = OutputReader::new(-1);
        assert!(reader.build().is_none());
    }

    #[test]
    fn reader_collects_pipe_bytes() {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        let mut reader = OutputReader::new(std::os::fd::AsRawFd::as_raw_fd(&read_fd));
        nix::unistd::write(&write_fd, b"hello world").unwrap();
        drop(write_fd);
        loop {
            match reader.on_data_available() {
                PollOutcome::Consumed(_) => continue,
                PollOutcome::Eof | PollOutcome::Error => break,
            }
        }
        let output = reader.build().unwrap();
        assert_eq!(&output.as_bytes()[..11], b"hello world");
    }
}
