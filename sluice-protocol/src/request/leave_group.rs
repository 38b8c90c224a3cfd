use crate::errors::ProtocolError;
use crate::utils::{get_string, put_string};
use bytes::{Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveGroupRequest {
    pub group: String,
    pub member_id: String,
}

impl LeaveGroupRequest {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.group);
        put_string(&mut buf, &self.member_id);
        buf.freeze()
    }

    pub fn deserialize(mut buf: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            group: get_string(&mut buf, "group")?,
            member_id: get_string(&mut buf, "member id")?,
        })
    }
}
