use crate::errors::ProtocolError;
use crate::utils::{get_string, get_u32, get_u64, put_string};
use bytes::{BufMut, Bytes, BytesMut};

/// `offset` is the next offset the group should read, i.e. last processed + 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOffsetRequest {
    pub group: String,
    pub member_id: String,
    pub generation: u32,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

//frame: [u32 group_len][group][u32 member_len][member][u32 generation][u32 topic_len][topic][u32 partition][u64 offset]

impl CommitOffsetRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.group);
        put_string(&mut buf, &self.member_id);
        buf.put_u32(self.generation);
        put_string(&mut buf, &self.topic);
        buf.put_u32(self.partition);
        buf.put_u64(self.offset);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            group: get_string(&mut buf, "group")?,
            member_id: get_string(&mut buf, "member id")?,
            generation: get_u32(&mut buf, "generation")?,
            topic: get_string(&mut buf, "topic")?,
            partition: get_u32(&mut buf, "partition")?,
            offset: get_u64(&mut buf, "offset")?,
        })
    }
}
