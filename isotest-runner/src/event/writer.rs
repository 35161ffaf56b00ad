//! The event writer: marshals events and writes them to a raw descriptor.
//!
//! A single `write(2)` call is issued for the header and another for the
//! body. Neither write is retried on a short write -- the parent's event
//! reader treats a missing terminal event as an error rather than blocking
//! indefinitely, so silently truncating here cannot deadlock.

use super::EventType;
use crate::failure::Failure;
use crate::suite::Stage;
use std::os::fd::RawFd;

/// Writes events to a file descriptor, typically the write end of the
/// forking runner's event pipe.
pub struct EventWriter {
    fd: RawFd,
}

impl EventWriter {
    /// Wrap a descriptor already open for writing.
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    fn write_once(&self, bytes: &[u8]) -> std::io::Result<usize> {
        #[cfg(unix)]
        {
            use nix::unistd::write;
            use std::os::fd::BorrowedFd;
            // SAFETY: `fd` is owned by the caller for the writer's lifetime.
            let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
            write(&borrowed, bytes).map_err(|e| std::io::Error::from_raw_os_error(e as i32))
        }
        #[cfg(not(unix))]
        {
            let _ = bytes;
            Err(std::io::Error::other("event writer requires unix"))
        }
    }

    fn write_frame(&self, event_type: EventType, payload: &[u8]) -> std::io::Result<()> {
        let mut header = [0_u8; 4];
        header[0..2].copy_from_slice(&(event_type as u16).to_le_bytes());
        header[2..4].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        self.write_once(&header)?;
        if !payload.is_empty() {
            self.write_once(payload)?;
        }
        Ok(())
    }

    /// Write a stage-change event.
    pub fn write_stage_change(&self, stage: Stage) -> std::io::Result<()> {
        self.write_frame(EventType::StageChange, &(stage as u32).to_le_bytes())
    }

    /// Write a failure event, encoding `failure` per
    /// [`crate::failure::Failure::encode`].
    pub fn write_failure(&self, failure: &Failure) -> std::io::Result<()> {
        let payload = failure.encode();
        self.write_frame(EventType::Failure, &payload)
    }
}
