/*
[ topic_len      : u32 ][ topic bytes ]
[ partition      : u32 ]
[ offset         : u64 ]
[ timestamp      : u64 ]
[ key_len        : u32 ][ key bytes ]
[ value_len      : u32 ][ value bytes ]
[ header_count   : u32 ]
[ headers: (key_len, key, val_len, val)* ]
*/
use crate::errors::DeserializeError;
use crate::utils::{get_bytes, get_string, get_u32, get_u64, put_bytes, put_string};
use bytes::{BufMut, Bytes, BytesMut};

/// A record as it travels between client and broker.
///
/// `partition` and `offset` are assigned by the broker; producers leave them zeroed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: u64, // Unix epoch in millis
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl WireRecord {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.topic);
        buf.put_u32(self.partition);
        buf.put_u64(self.offset);
        buf.put_u64(self.timestamp);
        put_bytes(buf, self.key.as_deref().unwrap_or_default());
        put_bytes(buf, &self.value);
        buf.put_u32(self.headers.len() as u32);
        for (k, v) in &self.headers {
            put_string(buf, k);
            put_bytes(buf, v);
        }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn decode(buf: &mut Bytes) -> Result<WireRecord, DeserializeError> {
        let topic = get_string(buf, "record topic")?;
        let partition = get_u32(buf, "record partition")?;
        let offset = get_u64(buf, "record offset")?;
        let timestamp = get_u64(buf, "record timestamp")?;

        let key = get_bytes(buf, "record key")?;
        let key = if key.is_empty() {
            None
        } else {
            Some(key.to_vec())
        };
        let value = get_bytes(buf, "record value")?.to_vec();

        let header_count = get_u32(buf, "header count")? as usize;
        let mut headers = Vec::with_capacity(header_count.min(64));
        for _ in 0..header_count {
            let k = get_string(buf, "header key")?;
            let v = get_bytes(buf, "header value")?.to_vec();
            headers.push((k, v));
        }

        Ok(WireRecord {
            topic,
            partition,
            offset,
            timestamp,
            key,
            value,
            headers,
        })
    }

    pub fn deserialize(mut buf: Bytes) -> Result<WireRecord, DeserializeError> {
        Self::decode(&mut buf)
    }
}
