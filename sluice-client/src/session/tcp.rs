use super::{BrokerSession, SessionFactory};
use crate::config::{ConsumerConfig, InitialOffset};
use crate::connection::Connection;
use crate::envelope::Envelope;
use crate::error::{ClientError, SessionError};
use crate::pipeline::{Offer, RecordHandler};
use async_trait::async_trait;
use sluice_protocol::{
    Assignment, CommitOffsetRequest, FetchRequest, JoinGroupRequest, LeaveGroupRequest,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Settings {
    group: String,
    instance_id: Option<String>,
    initial_offset: InitialOffset,
    fetch_interval: Duration,
    fetch_max_records: u32,
}

/// Opens a fresh broker connection for every session.
#[derive(Debug, Clone)]
pub struct TcpSessionFactory {
    brokers: Vec<String>,
    request_timeout: Duration,
    settings: Settings,
}

impl TcpSessionFactory {
    pub fn from_config(config: &ConsumerConfig) -> Self {
        TcpSessionFactory {
            brokers: config.brokers.clone(),
            request_timeout: config.request_timeout(),
            settings: Settings {
                group: config.group.clone(),
                instance_id: config.instance_id.clone(),
                initial_offset: config.initial_offset,
                fetch_interval: config.fetch_interval(),
                fetch_max_records: config.fetch_max_records,
            },
        }
    }

    /// Checks that at least one broker accepts connections.
    pub async fn probe(&self) -> Result<(), ClientError> {
        let mut conn = Connection::connect_any(&self.brokers, self.request_timeout).await?;
        conn.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for TcpSessionFactory {
    async fn create(&self) -> Result<Box<dyn BrokerSession>, SessionError> {
        let conn = Connection::connect_any(&self.brokers, self.request_timeout).await?;
        Ok(Box::new(TcpSession::new(conn, self.settings.clone())))
    }
}

#[derive(Debug)]
struct Member {
    id: String,
    generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct PartitionState {
    /// Next offset to fetch.
    position: u64,
    /// Next offset the group will resume from, as last committed.
    committed: Option<u64>,
}

type PartitionKey = (String, u32);

pub struct TcpSession {
    conn: Connection,
    settings: Settings,
    member: Option<Member>,
    partitions: BTreeMap<PartitionKey, PartitionState>,
}

impl TcpSession {
    fn new(conn: Connection, settings: Settings) -> Self {
        TcpSession {
            conn,
            settings,
            member: None,
            partitions: BTreeMap::new(),
        }
    }

    fn seed(&mut self, assignments: Vec<Assignment>) {
        self.partitions.clear();
        for a in assignments {
            let position = match (a.committed, self.settings.initial_offset) {
                (Some(committed), _) => committed.max(a.log_start),
                (None, InitialOffset::Oldest) => a.log_start,
                (None, InitialOffset::Newest) => a.log_end,
            };
            debug!(topic = %a.topic, partition = a.partition, position, "partition assigned");
            self.partitions.insert(
                (a.topic, a.partition),
                PartitionState {
                    position,
                    committed: a.committed,
                },
            );
        }
    }

    fn member(&self) -> Result<&Member, SessionError> {
        self.member
            .as_ref()
            .ok_or_else(|| SessionError::Other("session used before joining".into()))
    }

    async fn poll(
        &mut self,
        cancel: &CancellationToken,
        handler: &mut RecordHandler<'_>,
    ) -> Result<(), SessionError> {
        let keys: Vec<PartitionKey> = self.partitions.keys().cloned().collect();
        for key in keys {
            let Some(position) = self.partitions.get(&key).map(|s| s.position) else {
                continue;
            };
            let member = self.member()?;
            let req = FetchRequest {
                group: self.settings.group.clone(),
                member_id: member.id.clone(),
                generation: member.generation,
                topic: key.0.clone(),
                partition: key.1,
                offset: position,
                max_records: self.settings.fetch_max_records,
            };
            let records = self.conn.fetch(&req).await?;

            for record in records {
                if record.offset < position {
                    continue;
                }
                let next = record.offset + 1;
                // commit marks while waiting so a full `incoming` can drain
                let mut pending = record;
                loop {
                    let offered = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        offered = handler.offer(pending) => offered?,
                    };
                    match offered {
                        Offer::Delivered => break,
                        Offer::Marked { mark, record } => {
                            self.commit_mark(mark, handler).await?;
                            pending = record;
                        }
                    }
                }
                if let Some(state) = self.partitions.get_mut(&key) {
                    state.position = next;
                }
            }
        }
        Ok(())
    }

    async fn commit_mark(
        &mut self,
        envelope: Envelope,
        handler: &mut RecordHandler<'_>,
    ) -> Result<(), SessionError> {
        let key = (envelope.topic, envelope.partition);
        let next = envelope.offset + 1;

        let Some(state) = self.partitions.get(&key).copied() else {
            debug!(topic = %key.0, partition = key.1, offset = envelope.offset, "mark for unowned partition dropped");
            handler.acknowledged();
            return Ok(());
        };
        // never handed out by this session, e.g. a greeting
        if envelope.offset >= state.position {
            debug!(topic = %key.0, partition = key.1, offset = envelope.offset, "mark ahead of fetch position ignored");
            handler.acknowledged();
            return Ok(());
        }
        if state.committed.is_some_and(|c| c >= next) {
            handler.acknowledged();
            return Ok(());
        }

        let member = self.member()?;
        let req = CommitOffsetRequest {
            group: self.settings.group.clone(),
            member_id: member.id.clone(),
            generation: member.generation,
            topic: key.0.clone(),
            partition: key.1,
            offset: next,
        };
        self.conn.commit_offset(&req).await?;

        if let Some(state) = self.partitions.get_mut(&key) {
            state.committed = Some(next);
        }
        handler.acknowledged();
        Ok(())
    }

    // marks queued after this point stay in the queue for the next session
    async fn flush_marks(&mut self, handler: &mut RecordHandler<'_>) {
        let mut flushed = 0usize;
        while let Some(envelope) = handler.try_next_mark() {
            if let Err(e) = self.commit_mark(envelope, handler).await {
                warn!(error = %e, flushed, "committing queued marks before teardown failed");
                return;
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "queued marks committed before teardown");
        }
    }
}

#[async_trait]
impl BrokerSession for TcpSession {
    async fn consume(
        &mut self,
        cancel: &CancellationToken,
        topics: &[String],
        handler: &mut RecordHandler<'_>,
    ) -> Result<(), SessionError> {
        if topics.is_empty() {
            return Err(SessionError::NoTopics);
        }

        let req = JoinGroupRequest {
            group: self.settings.group.clone(),
            instance_id: self.settings.instance_id.clone(),
            topics: topics.to_vec(),
        };
        let ack = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            ack = self.conn.join_group(&req) => ack?,
        };
        info!(
            broker = %self.conn.addr(),
            group = %self.settings.group,
            member = %ack.member_id,
            generation = ack.generation,
            partitions = ack.assignments.len(),
            "joined group"
        );
        self.member = Some(Member {
            id: ack.member_id,
            generation: ack.generation,
        });
        self.seed(ack.assignments);

        let mut ticker = tokio::time::interval(self.settings.fetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.flush_marks(handler).await;
                    return Ok(());
                }
                mark = handler.next_mark() => match mark {
                    Some(envelope) => self.commit_mark(envelope, handler).await?,
                    None => return Err(SessionError::Cancelled),
                },
                _ = ticker.tick() => self.poll(cancel, handler).await?,
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let result = match self.member.take() {
            Some(member) => {
                let req = LeaveGroupRequest {
                    group: self.settings.group.clone(),
                    member_id: member.id,
                };
                self.conn.leave_group(&req).await.map_err(SessionError::from)
            }
            None => Ok(()),
        };
        self.partitions.clear();
        self.conn.shutdown().await;

        if result.is_ok() {
            info!(group = %self.settings.group, "left group");
        }
        result
    }
}
