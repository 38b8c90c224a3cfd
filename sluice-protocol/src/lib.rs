pub mod errors;
pub mod frame;
pub mod op_code;
pub mod payload;
pub mod record;
mod request;
mod response;
mod utils;

pub use errors::{DeserializeError, ProtocolError};
pub use frame::{Frame, FrameType, MAX_PAYLOAD_LEN};
pub use op_code::OpCode;
pub use payload::{RequestPayload, ResponsePayload};
pub use record::WireRecord;

pub use request::{
    CommitOffsetRequest, FetchRequest, JoinGroupRequest, LeaveGroupRequest, MetadataRequest,
    ProduceRequest,
};
pub use response::{
    Assignment, ErrorCode, ErrorResponse, FetchResponse, JoinAck, MetadataResponse, ProduceAck,
    TopicMetadata,
};
