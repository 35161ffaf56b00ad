//! The failure record and its wire encoding.
//!
//! A [`Failure`] must be able to cross a process boundary as one contiguous
//! byte block. Rust values already own their data, so the flattening step
//! here is a plain length-prefixed encoding: `encode`/`decode` are a single
//! combined format-then-serialize and deserialize pass, and `decode`
//! validates every length against the remaining buffer instead of trusting
//! pointer arithmetic.

use crate::errors::DecodeError;
use crate::suite::Stage;
use bytes::{Buf, BufMut, BytesMut};

/// A source location: filename plus 1-based line number.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// The source file, if known.
    pub filename: Option<String>,
    /// The 1-based line number.
    pub line: u32,
}

/// One frame of a captured call stack, innermost first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stackframe {
    /// The frame's instruction address.
    pub addr: u64,
    /// The source file the frame resolves to, if known.
    pub filename: Option<String>,
    /// The 1-based line number the frame resolves to, if known.
    pub line: Option<u32>,
}

/// An ordered sequence of stack frames, innermost first.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Stacktrace {
    /// The captured frames.
    pub frames: Vec<Stackframe>,
}

/// A flat, self-contained description of one fault.
///
/// A failure is owned by exactly one holder at a time; ownership transfers
/// with every API that accepts it (in Rust terms: every such API takes
/// `Failure` by value).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure {
    /// Which stage the failure was raised in.
    pub stage: Stage,
    /// A human-readable description of the fault.
    pub description: String,
    /// The source location the failure was constructed with, if any.
    pub location: Option<Location>,
    /// A captured call stack, if any.
    pub stacktrace: Option<Stacktrace>,
}

const TAG_ABSENT: u8 = 0;
const TAG_PRESENT: u8 = 1;

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut impl Buf, remaining_reason: &'static str) -> Result<String, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::new(remaining_reason));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(DecodeError::new(remaining_reason));
    }
    let mut bytes = vec![0_u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| DecodeError::new("failure description is not valid UTF-8"))
}

impl Location {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.line);
        match &self.filename {
            Some(filename) => {
                buf.put_u8(TAG_PRESENT);
                put_string(buf, filename);
            }
            None => buf.put_u8(TAG_ABSENT),
        }
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
        if buf.remaining() < 5 {
            return Err(DecodeError::new("truncated location"));
        }
        let line = buf.get_u32_le();
        let filename = match buf.get_u8() {
            TAG_PRESENT => Some(get_string(buf, "truncated location filename")?),
            _ => None,
        };
        Ok(Self { filename, line })
    }
}

impl Stackframe {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.addr);
        match &self.filename {
            Some(filename) => {
                buf.put_u8(TAG_PRESENT);
                put_string(buf, filename);
            }
            None => buf.put_u8(TAG_ABSENT),
        }
        match self.line {
            Some(line) => {
                buf.put_u8(TAG_PRESENT);
                buf.put_u32_le(line);
            }
            None => buf.put_u8(TAG_ABSENT),
        }
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
        if buf.remaining() < 9 {
            return Err(DecodeError::new("truncated stackframe"));
        }
        let addr = buf.get_u64_le();
        let filename = match buf.get_u8() {
            TAG_PRESENT => Some(get_string(buf, "truncated stackframe filename")?),
            _ => None,
        };
        if buf.remaining() < 1 {
            return Err(DecodeError::new("truncated stackframe"));
        }
        let line = match buf.get_u8() {
            TAG_PRESENT => {
                if buf.remaining() < 4 {
                    return Err(DecodeError::new("truncated stackframe line"));
                }
                Some(buf.get_u32_le())
            }
            _ => None,
        };
        Ok(Self {
            addr,
            filename,
            line,
        })
    }
}

impl Stacktrace {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.frames.len() as u32);
        for frame in &self.frames {
            frame.encode(buf);
        }
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
        if buf.remaining() < 4 {
            return Err(DecodeError::new("truncated stacktrace"));
        }
        let count = buf.get_u32_le() as usize;
        let mut frames = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            frames.push(Stackframe::decode(buf)?);
        }
        Ok(Self { frames })
    }
}

impl Failure {
    /// Construct a new failure. There is no separate sizing step, since
    /// `Failure` is an ordinary owned value.
    pub fn new(
        stage: Stage,
        description: impl Into<String>,
        location: Option<Location>,
        stacktrace: Option<Stacktrace>,
    ) -> Self {
        Self {
            stage,
            description: description.into(),
            location,
            stacktrace,
        }
    }

    /// Flatten this failure into a self-contained, position-independent
    /// byte block suitable for transport across a pipe, using owned-buffer
    /// length prefixes in place of rewritten interior pointers.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.stage as u32);
        put_string(&mut buf, &self.description);
        match &self.location {
            Some(location) => {
                buf.put_u8(TAG_PRESENT);
                location.encode(&mut buf);
            }
            None => buf.put_u8(TAG_ABSENT),
        }
        match &self.stacktrace {
            Some(stacktrace) => {
                buf.put_u8(TAG_PRESENT);
                stacktrace.encode(&mut buf);
            }
            None => buf.put_u8(TAG_ABSENT),
        }
        buf.to_vec()
    }

    /// Reconstruct a failure from a buffer produced by [`Self::encode`].
    /// Every embedded length is checked against the remaining slice before
    /// it is trusted, so a truncated or adversarial buffer yields a
    /// [`DecodeError`] rather than an out-of-bounds read.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.remaining() < 4 {
            return Err(DecodeError::new("truncated failure header"));
        }
        let stage = match bytes.get_u32_le() {
            0 => Stage::Setup,
            1 => Stage::Execution,
            2 => Stage::Teardown,
            other => return Err(stage_out_of_range(other)),
        };
        let description = get_string(&mut bytes, "truncated failure description")?;
        if bytes.remaining() < 1 {
            return Err(DecodeError::new("truncated failure location tag"));
        }
        let location = match bytes.get_u8() {
            TAG_PRESENT => Some(Location::decode(&mut bytes)?),
            _ => None,
        };
        if bytes.remaining() < 1 {
            return Err(DecodeError::new("truncated failure stacktrace tag"));
        }
        let stacktrace = match bytes.get_u8() {
            TAG_PRESENT => Some(Stacktrace::decode(&mut bytes)?),
            _ => None,
        };
        Ok(Self {
            stage,
            description,
            location,
            stacktrace,
        })
    }
}

fn stage_out_of_range(value: u32) -> DecodeError {
    let _ = value;
    DecodeError::new("stage discriminator out of range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_minimal_failure() {
        let failure = Failure::new(Stage::Execution, "boom", None, None);
        let encoded = failure.encode();
        let decoded = Failure::decode(&encoded).unwrap();
        assert_eq!(failure, decoded);
    }

    #[test]
    fn round_trips_full_failure() {
        let failure = Failure::new(
            Stage::Teardown,
            "cleanup broken",
            Some(Location {
                filename: Some("src/lib.rs".to_string()),
                line: 42,
            }),
            Some(Stacktrace {
                frames: vec![
                    Stackframe {
                        addr: 0xdead_beef,
                        filename: Some("src/lib.rs".to_string()),
                        line: Some(42),
                    },
                    Stackframe {
                        addr: 0xcafe_0000,
                        filename: None,
                        line: None,
                    },
                ],
            }),
        );
        let encoded = failure.encode();
        let decoded = Failure::decode(&encoded).unwrap();
        assert_eq!(failure, decoded);
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let failure = Failure::new(Stage::Setup, "x", None, None);
        let mut encoded = failure.encode();
        encoded.truncate(encoded.len() - 1);
        assert!(Failure::decode(&encoded).is_err());
    }

    #[test]
    fn decode_rejects_empty_buffer() {
        assert!(Failure::decode(&[]).is_err());
    }
}
