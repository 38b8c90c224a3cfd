mod commit_offset;
mod fetch;
mod join_group;
mod leave_group;
mod metadata;
mod produce;

pub use commit_offset::CommitOffsetRequest;
pub use fetch::FetchRequest;
pub use join_group::JoinGroupRequest;
pub use leave_group::LeaveGroupRequest;
pub use metadata::MetadataRequest;
pub use produce::ProduceRequest;
