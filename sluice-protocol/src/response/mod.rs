mod error_response;
mod fetch_response;
mod join_ack;
mod metadata_response;
mod produce_ack;

pub use error_response::{ErrorCode, ErrorResponse};
pub use fetch_response::FetchResponse;
pub use join_ack::{Assignment, JoinAck};
pub use metadata_response::{MetadataResponse, TopicMetadata};
pub use produce_ack::ProduceAck;
