use crate::errors::ProtocolError;
use crate::utils::{get_string, get_u32, get_u8, put_string};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRequest {
    /// `None` lists every topic the broker knows about.
    pub topics: Option<Vec<String>>,
}

impl MetadataRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match &self.topics {
            Some(topics) => {
                buf.put_u8(1);
                buf.put_u32(topics.len() as u32);
                for topic in topics {
                    put_string(&mut buf, topic);
                }
            }
            None => buf.put_u8(0),
        }
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let topics = match get_u8(&mut buf, "topics flag")? {
            0 => None,
            1 => {
                let count = get_u32(&mut buf, "topic count")?;
                let mut topics = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    topics.push(get_string(&mut buf, "topic")?);
                }
                Some(topics)
            }
            other => {
                return Err(ProtocolError::PayloadError(format!(
                    "Invalid topics flag {other}"
                )));
            }
        };
        Ok(Self { topics })
    }
}
