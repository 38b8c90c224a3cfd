use crate::errors::ProtocolError;
use crate::utils::{get_string, get_u32, get_u64, get_u8, put_string};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub topic: String,
    pub partition: u32,
    /// Next offset to read as last committed by the group, if any.
    pub committed: Option<u64>,
    pub log_start: u64,
    pub log_end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAck {
    pub member_id: String,
    pub generation: u32,
    pub assignments: Vec<Assignment>,
}

/*
frame: [u32 member_len][member][u32 generation][u32 count]
       ([u32 topic_len][topic][u32 partition][u8 has_committed][u64 committed]?[u64 log_start][u64 log_end])*
*/
impl JoinAck {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.member_id);
        buf.put_u32(self.generation);
        buf.put_u32(self.assignments.len() as u32);
        for a in &self.assignments {
            put_string(&mut buf, &a.topic);
            buf.put_u32(a.partition);
            match a.committed {
                Some(offset) => {
                    buf.put_u8(1);
                    buf.put_u64(offset);
                }
                None => buf.put_u8(0),
            }
            buf.put_u64(a.log_start);
            buf.put_u64(a.log_end);
        }
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let member_id = get_string(&mut buf, "member id")?;
        let generation = get_u32(&mut buf, "generation")?;
        let count = get_u32(&mut buf, "assignment count")?;
        let mut assignments = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let topic = get_string(&mut buf, "assignment topic")?;
            let partition = get_u32(&mut buf, "assignment partition")?;
            let committed = match get_u8(&mut buf, "committed flag")? {
                0 => None,
                _ => Some(get_u64(&mut buf, "committed offset")?),
            };
            assignments.push(Assignment {
                topic,
                partition,
                committed,
                log_start: get_u64(&mut buf, "log start")?,
                log_end: get_u64(&mut buf, "log end")?,
            });
        }

        Ok(JoinAck {
            member_id,
            generation,
            assignments,
        })
    }
}
