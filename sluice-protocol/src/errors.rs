use std::io::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown opcode: {0}")]
    UnknownOpCode(u8),

    #[error("Payload decode error: {0}")]
    PayloadError(String),

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("Frame payload of {0} bytes exceeds the maximum")]
    FrameTooLarge(usize),

    #[error("Checksum Mismatch expected: {expected} found: {found}")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("IoError: {0}")]
    IoError(#[from] Error),

    #[error("Record deserialize error: {0}")]
    RecordDeserializeError(#[from] DeserializeError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeserializeError {
    #[error("Unexpected end of input while reading {0}")]
    UnexpectedEOF(&'static str),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}
