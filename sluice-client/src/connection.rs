use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use sluice_protocol::{
    CommitOffsetRequest, ErrorResponse, FetchRequest, FetchResponse, Frame, FrameType, JoinAck,
    JoinGroupRequest, LeaveGroupRequest, MetadataRequest, MetadataResponse, OpCode, ProduceAck,
    ProduceRequest, ProtocolError, RequestPayload, ResponsePayload, TopicMetadata, WireRecord,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// One request/response connection to a broker.
///
/// A request that times out leaves the stream in an unknown state; callers
/// drop the connection after any error.
pub struct Connection {
    stream: TcpStream,
    addr: String,
    read_buf: BytesMut,
    correlation_id: u32,
    request_timeout: Duration,
}

impl Connection {
    pub async fn connect(addr: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let stream = match tokio::time::timeout(request_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => return Err(ClientError::Timeout(request_timeout)),
        };
        stream.set_nodelay(true).ok();
        debug!(addr, "connected to broker");

        Ok(Connection {
            stream,
            addr: addr.to_string(),
            read_buf: BytesMut::with_capacity(4096),
            correlation_id: 0,
            request_timeout,
        })
    }

    /// Tries each address in order and returns the first that accepts.
    pub async fn connect_any(
        addrs: &[String],
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        for addr in addrs {
            match Self::connect(addr, request_timeout).await {
                Ok(conn) => return Ok(conn),
                Err(e) => warn!(addr = %addr, error = %e, "broker unreachable"),
            }
        }
        Err(ClientError::NoBrokerAvailable(addrs.to_vec()))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn produce(&mut self, record: WireRecord) -> Result<ProduceAck, ClientError> {
        let data = ProduceRequest { record }.serialize();
        let resp = self.round_trip(OpCode::Produce, data).await?;
        Ok(ProduceAck::deserialize(resp)?)
    }

    pub async fn join_group(&mut self, req: &JoinGroupRequest) -> Result<JoinAck, ClientError> {
        let resp = self.round_trip(OpCode::JoinGroup, req.serialize()).await?;
        Ok(JoinAck::deserialize(resp)?)
    }

    pub async fn fetch(&mut self, req: &FetchRequest) -> Result<Vec<WireRecord>, ClientError> {
        let resp = self.round_trip(OpCode::Fetch, req.serialize()).await?;
        Ok(FetchResponse::deserialize(resp)?.records)
    }

    pub async fn commit_offset(&mut self, req: &CommitOffsetRequest) -> Result<(), ClientError> {
        self.round_trip(OpCode::CommitOffset, req.serialize())
            .await
            .map(|_| ())
    }

    pub async fn leave_group(&mut self, req: &LeaveGroupRequest) -> Result<(), ClientError> {
        self.round_trip(OpCode::LeaveGroup, req.serialize())
            .await
            .map(|_| ())
    }

    pub async fn metadata(
        &mut self,
        topics: Option<Vec<String>>,
    ) -> Result<Vec<TopicMetadata>, ClientError> {
        let data = MetadataRequest { topics }.serialize();
        let resp = self.round_trip(OpCode::Metadata, data).await?;
        Ok(MetadataResponse::deserialize(resp)?.topics)
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(addr = %self.addr, error = %e, "socket shutdown failed");
        }
    }

    async fn round_trip(&mut self, op_code: OpCode, data: Bytes) -> Result<Bytes, ClientError> {
        let timeout = self.request_timeout;
        match tokio::time::timeout(timeout, self.exchange(op_code, data)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(timeout)),
        }
    }

    async fn exchange(&mut self, op_code: OpCode, data: Bytes) -> Result<Bytes, ClientError> {
        let sent = self.send_request(RequestPayload::new(op_code, data)).await?;
        let frame = self.read_frame().await?;

        if frame.correlation_id != sent {
            return Err(ClientError::CorrelationMismatch {
                sent,
                received: frame.correlation_id,
            });
        }

        match frame.frame_type {
            FrameType::Error => {
                let err = ErrorResponse::deserialize(frame.payload)?;
                Err(ClientError::Broker {
                    code: err.code,
                    message: err.message,
                })
            }
            FrameType::Response => {
                let payload = ResponsePayload::deserialize(frame.payload)?;
                if payload.op_code != op_code {
                    return Err(ClientError::UnexpectedResponse(payload.op_code));
                }
                Ok(payload.data)
            }
            other => Err(ClientError::Protocol(ProtocolError::PayloadError(format!(
                "unexpected {other:?} frame in reply"
            )))),
        }
    }

    async fn send_request(&mut self, payload: RequestPayload) -> Result<u32, ClientError> {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        let frame = Frame::new(FrameType::Request, self.correlation_id, payload.serialize());

        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.stream
            .write_all(&buf)
            .await
            .map_err(ProtocolError::IoError)?;
        Ok(self.correlation_id)
    }

    // a reply may span several reads, or share one with nothing else
    async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                return Ok(frame);
            }
            self.read_buf.reserve(4096);
            let n = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(ProtocolError::IoError)?;
            if n == 0 {
                return Err(ClientError::Disconnected);
            }
        }
    }
}
