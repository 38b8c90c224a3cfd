use crate::errors::ProtocolError;
use crate::record::WireRecord;
use crate::utils::get_u32;
use bytes::{BufMut, Bytes, BytesMut};

/// Records in offset order for a single topic-partition. Empty means caught up.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub records: Vec<WireRecord>,
}

impl FetchResponse {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(self.records.len() as u32);
        for record in &self.records {
            record.encode(&mut buf);
        }
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let count = get_u32(&mut buf, "record count")?;
        let mut records = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            records.push(WireRecord::decode(&mut buf)?);
        }
        Ok(FetchResponse { records })
    }
}
