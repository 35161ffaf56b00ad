//! The event reader: a poll handler that decodes framed events into a
//! consumer.
//!
//! A two-state machine -- awaiting-header (capacity 4) and awaiting-body
//! (capacity = header length). The decoder never blocks; it is driven
//! exclusively by [`crate::poll::PollHandler::on_data_available`].

use super::{EventType, HEADER_LEN};
use crate::failure::Failure;
use crate::poll::{PollHandler, PollOutcome};
use crate::suite::Stage;
use std::os::fd::RawFd;

/// The sink events are delivered to once fully decoded.
pub trait EventConsumer {
    /// A stage-change event was received.
    fn on_stage_change(&mut self, stage: Stage);
    /// A failure event was received and successfully decoded.
    fn on_failure(&mut self, failure: Failure);
}

enum State {
    Header { buf: [u8; HEADER_LEN], ofs: usize },
    Body { event_type: u16, buf: Vec<u8>, ofs: usize },
}

impl State {
    fn header() -> Self {
        Self::Header {
            buf: [0; HEADER_LEN],
            ofs: 0,
        }
    }
}

/// Reads framed events from a descriptor and delivers them to a consumer.
pub struct EventReader<C> {
    fd: RawFd,
    state: State,
    consumer: C,
}

impl<C: EventConsumer> EventReader<C> {
    /// Build a reader over `fd`, delivering decoded events to `consumer`.
    pub fn new(fd: RawFd, consumer: C) -> Self {
        Self {
            fd,
            state: State::header(),
            consumer,
        }
    }

    /// Consume the reader, returning its consumer.
    pub fn into_consumer(self) -> C {
        self.consumer
    }

    fn read_once(fd: RawFd, buf: &mut [u8]) -> PollOutcome {
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
            let _ = (fd, buf);
            PollOutcome::Error
        }
    }

    fn on_header_complete(&mut self, header: [u8; HEADER_LEN]) {
        let event_type = u16::from_le_bytes([header[0], header[1]]);
        let length = u16::from_le_bytes([header[2], header[3]]) as usize;
        self.state = State::Body {
            event_type,
            buf: vec![0_u8; length],
            ofs: 0,
        };
    }

    fn on_body_complete(&mut self, event_type: u16, buf: Vec<u8>) {
        match EventType::from_u16(event_type) {
            Some(EventType::StageChange) => {
                if buf.len() >= 4 {
                    let stage = match u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) {
                        0 => Some(Stage::Setup),
                        1 => Some(Stage::Execution),
                        2 => Some(Stage::Teardown),
                        _ => None,
                    };
                    if let Some(stage) = stage {
                        self.consumer.on_stage_change(stage);
                    }
                }
                // Malformed (too short) or out-of-range payloads are
                // dropped; excess bytes beyond what the event needs are
                // always ignored (overlong bodies).
            }
            Some(EventType::Failure) => {
                if let Ok(failure) = Failure::decode(&buf) {
                    self.consumer.on_failure(failure);
                }
                // Malformed failure payloads drop the event silently.
            }
            None => {
                // Unrecognized event type: already fully drained by
                // reading `length` bytes into `buf`; nothing to deliver.
            }
        }
        self.state = State::header();
    }
}

impl<C: EventConsumer> PollHandler for EventReader<C> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn on_data_available(&mut self) -> PollOutcome {
        match &mut self.state {
            State::Header { buf, ofs } => {
                let outcome = Self::read_once(self.fd, &mut buf[*ofs..]);
                if let PollOutcome::Consumed(n) = outcome {
                    *ofs += n;
                    if *ofs == HEADER_LEN {
                        let header = *buf;
                        self.on_header_complete(header);
                    }
                }
                outcome
            }
            State::Body { buf, ofs, .. } => {
                let outcome = Self::read_once(self.fd, &mut buf[*ofs..]);
                if let PollOutcome::Consumed(n) = outcome {
                    *ofs += n;
                    if *ofs == buf.len() {
                        let (event_type, buf) = match std::mem::replace(
                            &mut self.state,
                            State::header(),
                        ) {
                            State::Body { event_type, buf, .. } => (event_type, buf),
                            State::Header { .. } => unreachable!(),
                        };
                        self.on_body_complete(event_type, buf);
                    }
                }
                outcome
            }
        }
    }

    fn on_close(&mut self) {}
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::event::EventWriter;

    #[derive(Default)]
    struct RecordingConsumer {
        stages: Vec<Stage>,
        failures: Vec<Failure>,
    }

    impl EventConsumer for RecordingConsumer {
        fn on_stage_change(&mut self, stage: Stage) {
            self.stages.push(stage);
        }
        fn on_failure(&mut self, failure: Failure) {
            self.failures.push(failure);
        }
    }

    fn pump<C: EventConsumer>(reader: &mut EventReader<C>) {
        loop {
            match reader.on_data_available() {
                PollOutcome::Consumed(_) => continue,
                PollOutcome::Eof | PollOutcome::Error => break,
            }
        }
    }

    #[test]
    fn decodes_stage_change_and_failure() {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        let writer = EventWriter::new(std::os::fd::AsRawFd::as_raw_fd(&write_fd));
        writer.write_stage_change(Stage::Execution).unwrap();
        let failure = Failure::new(Stage::Execution, "boom", None, None);
        writer.write_failure(&failure).unwrap();
        drop(write_fd);

        let mut reader = EventReader::new(
            std::os::fd::AsRawFd::as_raw_fd(&read_fd),
            RecordingConsumer::default(),
        );
        pump(&mut reader);
        let consumer = reader.into_consumer();
        assert_eq!(consumer.stages, vec![Stage::Execution]);
        assert_eq!(consumer.failures, vec![failure]);
    }
}
