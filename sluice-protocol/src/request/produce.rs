use crate::errors::ProtocolError;
use crate::record::WireRecord;
use bytes::Bytes;

/// The record's `partition` and `offset` are ignored by the broker.
#[derive(Debug)]
pub struct ProduceRequest {
    pub record: WireRecord,
}

impl ProduceRequest {
    pub fn serialize(&self) -> Bytes {
        self.record.serialize()
    }

    pub fn deserialize(buf: Bytes) -> Result<Self, ProtocolError> {
        let record = WireRecord::deserialize(buf)?;
        if record.topic.is_empty() {
            return Err(ProtocolError::PayloadError("Produce request without topic".into()));
        }
        Ok(ProduceRequest { record })
    }
}
