use sluice_protocol::{DeserializeError, ErrorCode, OpCode, ProtocolError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures on a single broker connection.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no broker reachable among {0:?}")]
    NoBrokerAvailable(Vec<String>),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("broker returned {code}: {message}")]
    Broker { code: ErrorCode, message: String },

    #[error("unexpected response op code {0:?}")]
    UnexpectedResponse(OpCode),

    #[error("correlation id mismatch: sent {sent}, received {received}")]
    CorrelationMismatch { sent: u32, received: u32 },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed by broker")]
    Disconnected,
}

impl From<DeserializeError> for ClientError {
    fn from(e: DeserializeError) -> Self {
        ClientError::Protocol(ProtocolError::from(e))
    }
}

/// Why a broker session's consume call returned.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session cancelled")]
    Cancelled,

    #[error("no topics provided")]
    NoTopics,

    #[error("i/o timeout")]
    Timeout,

    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("group rebalance: {0}")]
    Rebalance(String),

    #[error(transparent)]
    Client(ClientError),

    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Transient errors end the current session but the coordinator starts a fresh one.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SessionError::Client(_) | SessionError::Other(_))
    }
}

impl From<ClientError> for SessionError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Timeout(_) => SessionError::Timeout,
            ClientError::Disconnected => SessionError::Disconnected("EOF".into()),
            ref lost @ (ClientError::Connect { .. } | ClientError::NoBrokerAvailable(_)) => {
                SessionError::Disconnected(lost.to_string())
            }
            ClientError::Protocol(ProtocolError::IoError(ref io)) if is_transport_loss(io) => {
                SessionError::Disconnected(io.to_string())
            }
            ClientError::Broker { code, ref message } if code.requires_rejoin() => {
                SessionError::Rebalance(format!("{code}: {message}"))
            }
            other => SessionError::Client(other),
        }
    }
}

fn is_transport_loss(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
    )
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid subscription pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("metadata request failed: {0}")]
    Metadata(#[from] ClientError),

    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("topic endpoint {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("every topic source failed")]
    AllSourcesFailed,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace entry for timestamp {0} already exists")]
    Collision(i64),

    #[error("malformed {header} header: {source}")]
    Malformed {
        header: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode trace header: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("invalid consumer configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("session close failed: {0}")]
    Session(#[from] SessionError),

    #[error("consumer is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("invalid producer configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("producer is closed")]
    Closed,
}
