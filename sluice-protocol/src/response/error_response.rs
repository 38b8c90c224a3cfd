use crate::errors::ProtocolError;
use crate::utils::{get_string, get_u16, put_string};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown = 1,
    UnknownTopic = 2,
    RebalanceInProgress = 3,
    UnknownMember = 4,
    IllegalGeneration = 5,
    InvalidRequest = 6,
    GroupAuthorizationFailed = 7,
}

impl ErrorCode {
    /// Codes after which a member is expected to rejoin the group.
    pub fn requires_rejoin(self) -> bool {
        matches!(
            self,
            ErrorCode::RebalanceInProgress | ErrorCode::UnknownMember | ErrorCode::IllegalGeneration
        )
    }
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            2 => ErrorCode::UnknownTopic,
            3 => ErrorCode::RebalanceInProgress,
            4 => ErrorCode::UnknownMember,
            5 => ErrorCode::IllegalGeneration,
            6 => ErrorCode::InvalidRequest,
            7 => ErrorCode::GroupAuthorizationFailed,
            _ => ErrorCode::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Payload of a `FrameType::Error` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.code as u16);
        put_string(&mut buf, &self.message);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            code: ErrorCode::from(get_u16(&mut buf, "error code")?),
            message: get_string(&mut buf, "error message")?,
        })
    }
}
