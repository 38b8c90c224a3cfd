use crate::errors::ProtocolError;
use crate::op_code::OpCode;
use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug)]
pub struct RequestPayload {
    pub op_code: OpCode,
    pub data: Bytes,
}

impl RequestPayload {
    pub fn new(op_code: OpCode, data: Bytes) -> Self {
        RequestPayload { op_code, data }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.data.len());
        buf.put_u8(self.op_code as u8);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 1 {
            return Err(ProtocolError::PayloadError("Empty request payload".into()));
        }

        let op_code = OpCode::try_from(buf.get_u8())?;
        Ok(RequestPayload { op_code, data: buf })
    }
}

#[derive(Debug)]
pub struct ResponsePayload {
    pub op_code: OpCode,
    pub data: Bytes,
}

impl ResponsePayload {
    pub fn new(op_code: OpCode, data: Bytes) -> Self {
        ResponsePayload { op_code, data }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.data.len());
        buf.put_u8(self.op_code as u8);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 1 {
            return Err(ProtocolError::PayloadError("Empty response payload".into()));
        }

        let op_code = OpCode::try_from(buf.get_u8())?;
        Ok(ResponsePayload { op_code, data: buf })
    }
}
