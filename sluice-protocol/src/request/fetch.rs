use crate::errors::ProtocolError;
use crate::utils::{get_string, get_u32, get_u64, put_string};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub group: String,
    pub member_id: String,
    pub generation: u32,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub max_records: u32,
}

/*
frame: [u32 group_len][group][u32 member_len][member][u32 generation]
       [u32 topic_len][topic][u32 partition][u64 offset][u32 max_records]
*/
impl FetchRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.group);
        put_string(&mut buf, &self.member_id);
        buf.put_u32(self.generation);
        put_string(&mut buf, &self.topic);
        buf.put_u32(self.partition);
        buf.put_u64(self.offset);
        buf.put_u32(self.max_records);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        Ok(FetchRequest {
            group: get_string(&mut buf, "group")?,
            member_id: get_string(&mut buf, "member id")?,
            generation: get_u32(&mut buf, "generation")?,
            topic: get_string(&mut buf, "topic")?,
            partition: get_u32(&mut buf, "partition")?,
            offset: get_u64(&mut buf, "offset")?,
            max_records: get_u32(&mut buf, "max records")?,
        })
    }
}
