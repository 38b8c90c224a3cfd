use crate::errors::ProtocolError;
use crate::utils::{get_string, get_u32, put_string};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    pub partitions: u32,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MetadataResponse {
    pub topics: Vec<TopicMetadata>,
}

impl MetadataResponse {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(self.topics.len() as u32);
        for topic in &self.topics {
            put_string(&mut buf, &topic.name);
            buf.put_u32(topic.partitions);
        }
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let count = get_u32(&mut buf, "topic count")?;
        let mut topics = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            topics.push(TopicMetadata {
                name: get_string(&mut buf, "topic")?,
                partitions: get_u32(&mut buf, "partition count")?,
            });
        }
        Ok(MetadataResponse { topics })
    }
}
