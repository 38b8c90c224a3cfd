use crate::errors::ProtocolError;
use crate::utils::{get_opt_string, get_string, get_u32, put_opt_string, put_string};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupRequest {
    pub group: String,
    /// Static membership id; a rejoin with the same id takes over the old member's assignment.
    pub instance_id: Option<String>,
    pub topics: Vec<String>,
}

/*
frame: [u32 group_len][group][u8 has_instance][u32 len][instance]?
       [u32 topic_count][(u32 topic_len, topic)*]
*/
impl JoinGroupRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.group);
        put_opt_string(&mut buf, self.instance_id.as_deref());
        buf.put_u32(self.topics.len() as u32);
        for topic in &self.topics {
            put_string(&mut buf, topic);
        }
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let group = get_string(&mut buf, "group")?;
        let instance_id = get_opt_string(&mut buf, "instance id")?;
        let topic_count = get_u32(&mut buf, "topic count")?;
        let mut topics = Vec::with_capacity(topic_count.min(1024) as usize);
        for _ in 0..topic_count {
            topics.push(get_string(&mut buf, "topic")?);
        }

        Ok(JoinGroupRequest {
            group,
            instance_id,
            topics,
        })
    }
}
