use crate::errors::ProtocolError;
use crate::utils::{get_u32, get_u64};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceAck {
    pub partition: u32,
    pub offset: u64,
}

impl ProduceAck {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(12);
        buf.put_u32(self.partition);
        buf.put_u64(self.offset);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        Ok(ProduceAck {
            partition: get_u32(&mut buf, "ack partition")?,
            offset: get_u64(&mut buf, "ack offset")?,
        })
    }
}
