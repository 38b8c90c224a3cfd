use crate::ProtocolError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    Produce = 1,
    Fetch = 2,
    JoinGroup = 3,
    CommitOffset = 4,
    LeaveGroup = 5,
    Metadata = 6,
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpCode::Produce),
            2 => Ok(OpCode::Fetch),
            3 => Ok(OpCode::JoinGroup),
            4 => Ok(OpCode::CommitOffset),
            5 => Ok(OpCode::LeaveGroup),
            6 => Ok(OpCode::Metadata),
            _ => Err(ProtocolError::UnknownOpCode(value)),
        }
    }
}
