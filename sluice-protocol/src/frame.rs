/*
[ version: u8 ]
[ frame_type: u8 ]
[ correlation_id: u32 ]
[ payload_len: u32 ]
[ checksum : u32 ]
[ payload bytes... ]
*/

use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use xxhash_rust::xxh32::xxh32;

pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 14;
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameType {
    Request = 1,
    Response = 2,
    Error = 3,
    Heartbeat = 4,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(FrameType::Request),
            2 => Ok(FrameType::Response),
            3 => Ok(FrameType::Error),
            4 => Ok(FrameType::Heartbeat),
            _ => Err(ProtocolError::UnknownFrameType(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub frame_type: FrameType,
    pub correlation_id: u32, // matches request to response
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, correlation_id: u32, payload: Bytes) -> Self {
        Frame {
            version: PROTOCOL_VERSION,
            frame_type,
            correlation_id,
            payload,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.put_u8(self.version);
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.correlation_id);
        buf.put_u32(self.payload.len() as u32);
        buf.put_u32(xxh32(&self.payload, 0));
        buf.extend_from_slice(&self.payload);
    }

    /// Returns `Ok(None)` until a whole frame is buffered; consumes nothing in that case.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut cursor = &buf[..];
        let version = cursor.get_u8();
        let frame_type_raw = cursor.get_u8();
        let correlation_id = cursor.get_u32();
        let payload_len = cursor.get_u32() as usize;
        let checksum_expected = cursor.get_u32();

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::FrameTooLarge(payload_len));
        }
        if cursor.remaining() < payload_len {
            buf.reserve(HEADER_LEN + payload_len - buf.len());
            return Ok(None);
        }

        let frame_type = FrameType::try_from(frame_type_raw)?;
        buf.advance(HEADER_LEN);
        let payload = buf.split_to(payload_len).freeze();
        let checksum_actual = xxh32(&payload, 0);
        if checksum_actual != checksum_expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected: checksum_expected,
                found: checksum_actual,
            });
        }

        Ok(Some(Frame {
            version,
            frame_type,
            correlation_id,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let frame = Frame::new(FrameType::Request, 7, Bytes::from_static(b"hello"));
        let mut full = BytesMut::new();
        frame.encode(&mut full);

        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(Frame::decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), full.len() - 2);

        partial.extend_from_slice(&full[full.len() - 2..]);
        let decoded = Frame::decode(&mut partial).unwrap().expect("complete frame");
        assert_eq!(decoded, frame);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut buf = BytesMut::new();
        Frame::new(FrameType::Request, 1, Bytes::from_static(b"a")).encode(&mut buf);
        Frame::new(FrameType::Response, 2, Bytes::from_static(b"bc")).encode(&mut buf);

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.correlation_id, 1);
        assert_eq!(second.frame_type, FrameType::Response);
        assert_eq!(&second.payload[..], b"bc");
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let mut buf = BytesMut::new();
        Frame::new(FrameType::Request, 1, Bytes::from_static(b"payload")).encode(&mut buf);
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(FrameType::Request as u8);
        buf.put_u32(1);
        buf.put_u32((MAX_PAYLOAD_LEN + 1) as u32);
        buf.put_u32(0);

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }
}
