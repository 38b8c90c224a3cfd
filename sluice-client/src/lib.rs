pub mod config;
pub mod connection;
pub mod consumer;
mod coordinator;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod producer;
pub mod resolver;
pub mod session;
pub mod trace;

pub use config::{ConsumerConfig, Discovery, InitialOffset, ProducerConfig};
pub use consumer::Consumer;
pub use coordinator::SessionState;
pub use envelope::Envelope;
pub use error::{
    ClientError, ConsumerError, DiscoveryError, ProducerError, SessionError, TraceError,
};
pub use pipeline::{Messages, Offer, RecordHandler, Stats};
pub use producer::Producer;
pub use resolver::{
    HttpResolver, MetadataResolver, StaticResolver, TopicDelta, TopicPatterns, TopicResolver,
    TopicSet,
};
pub use session::{BrokerSession, SessionFactory, TcpSessionFactory};
pub use trace::TraceIdentity;
