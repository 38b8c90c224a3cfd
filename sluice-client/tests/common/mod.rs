#![allow(dead_code)]

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use sluice_client::{
    BrokerSession, ConsumerConfig, DiscoveryError, RecordHandler, SessionError, SessionFactory,
    TopicResolver,
};
use sluice_protocol::{
    Assignment, CommitOffsetRequest, ErrorCode, ErrorResponse, FetchRequest, FetchResponse, Frame,
    FrameType, JoinAck, JoinGroupRequest, LeaveGroupRequest, MetadataRequest, MetadataResponse,
    OpCode, ProduceAck, ProduceRequest, ProtocolError, RequestPayload, ResponsePayload,
    TopicMetadata, WireRecord,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Fast timings so lifecycle tests finish in milliseconds.
pub fn test_config() -> ConsumerConfig {
    ConsumerConfig {
        group: "analytics".into(),
        subscribe: names(&[".*"]),
        queue_capacity: 1_000,
        fetch_interval_ms: 5,
        idle_poll_ms: 10,
        restart_backoff_ms: 20,
        close_timeout_ms: 500,
        report_interval_ms: 60_000,
        ..Default::default()
    }
}

/// Polls `check` until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, fut)
        .await
        .expect("operation did not finish in time")
}

// ---------------------------------------------------------------------------
// resolver

/// A resolver whose answer the test controls.
pub struct ScriptedResolver {
    answer: Mutex<Option<Vec<String>>>,
}

impl ScriptedResolver {
    pub fn new(topics: &[&str]) -> Arc<Self> {
        Arc::new(ScriptedResolver {
            answer: Mutex::new(Some(names(topics))),
        })
    }

    pub fn set(&self, topics: &[&str]) {
        *self.answer.lock() = Some(names(topics));
    }

    /// Every resolution fails until the next `set`.
    pub fn fail(&self) {
        *self.answer.lock() = None;
    }
}

#[async_trait]
impl TopicResolver for ScriptedResolver {
    async fn resolve(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut topics = self
            .answer
            .lock()
            .clone()
            .ok_or(DiscoveryError::AllSourcesFailed)?;
        topics.sort();
        Ok(topics)
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// in-memory sessions

/// How the next created session behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Healthy,
    /// Fails with a transport timeout after its first delivery round.
    Transient,
    /// Fails with an unclassified error after its first delivery round.
    Fatal,
    /// Never returns from `close`.
    HangOnClose,
}

#[derive(Debug, Default)]
pub struct Probe {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub topic_lists: Mutex<Vec<Vec<String>>>,
    pub commits: Mutex<Vec<(String, u32, u64)>>,
    next_offset: Mutex<HashMap<String, u64>>,
}

impl Probe {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn topic_lists(&self) -> Vec<Vec<String>> {
        self.topic_lists.lock().clone()
    }
}

pub struct MockFactory {
    pub probe: Arc<Probe>,
    scripts: Mutex<VecDeque<Script>>,
    failing_creates: AtomicUsize,
    /// Records delivered per topic on every tick; zero keeps sessions silent.
    records_per_tick: usize,
}

impl MockFactory {
    pub fn new(records_per_tick: usize) -> Arc<Self> {
        Arc::new(MockFactory {
            probe: Arc::new(Probe::default()),
            scripts: Mutex::new(VecDeque::new()),
            failing_creates: AtomicUsize::new(0),
            records_per_tick,
        })
    }

    pub fn script(&self, scripts: &[Script]) {
        self.scripts.lock().extend(scripts.iter().copied());
    }

    pub fn fail_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn create(&self) -> Result<Box<dyn BrokerSession>, SessionError> {
        let failing = self.failing_creates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_creates.store(failing - 1, Ordering::SeqCst);
            return Err(SessionError::Disconnected("broker refused".into()));
        }
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Healthy);
        Ok(Box::new(MockSession {
            probe: Arc::clone(&self.probe),
            script,
            records_per_tick: self.records_per_tick,
            consumed: false,
        }))
    }
}

pub struct MockSession {
    probe: Arc<Probe>,
    script: Script,
    records_per_tick: usize,
    consumed: bool,
}

impl MockSession {
    async fn deliver_round(
        &self,
        topics: &[String],
        handler: &mut RecordHandler<'_>,
    ) -> Result<(), SessionError> {
        for topic in topics {
            for _ in 0..self.records_per_tick {
                let offset = {
                    let mut next = self.probe.next_offset.lock();
                    let slot = next.entry(topic.clone()).or_insert(0);
                    *slot += 1;
                    *slot - 1
                };
                handler
                    .deliver(WireRecord {
                        topic: topic.clone(),
                        offset,
                        value: format!("{topic}-{offset}").into_bytes(),
                        ..Default::default()
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for MockSession {
    async fn consume(
        &mut self,
        cancel: &CancellationToken,
        topics: &[String],
        handler: &mut RecordHandler<'_>,
    ) -> Result<(), SessionError> {
        self.consumed = true;
        let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(now, Ordering::SeqCst);
        self.probe.topic_lists.lock().push(topics.to_vec());

        let mut ticker = tokio::time::interval(Duration::from_millis(5));
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    while let Some(mark) = handler.try_next_mark() {
                        self.probe.commits.lock().push((mark.topic, mark.partition, mark.offset));
                        handler.acknowledged();
                    }
                    return Ok(());
                }
                mark = handler.next_mark() => {
                    let Some(mark) = mark else {
                        return Err(SessionError::Cancelled);
                    };
                    self.probe.commits.lock().push((mark.topic, mark.partition, mark.offset));
                    handler.acknowledged();
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        delivered = self.deliver_round(topics, handler) => delivered?,
                    }
                    match self.script {
                        Script::Transient => return Err(SessionError::Timeout),
                        Script::Fatal => return Err(SessionError::Other("offsets corrupted".into())),
                        Script::Healthy | Script::HangOnClose => {}
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.script == Script::HangOnClose {
            std::future::pending::<()>().await;
        }
        if self.consumed {
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
        }
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// in-memory broker

#[derive(Debug, Default)]
pub struct BrokerState {
    pub logs: BTreeMap<String, Vec<Vec<WireRecord>>>,
    /// (group, topic, partition) -> next offset
    pub commits: HashMap<(String, String, u32), u64>,
    pub joins: Vec<JoinGroupRequest>,
    pub leaves: Vec<LeaveGroupRequest>,
    members: HashMap<String, u32>,
    generation: u32,
    fail_next_fetch: Option<ErrorCode>,
}

impl BrokerState {
    fn append(&mut self, mut record: WireRecord) -> Result<ProduceAck, ErrorResponse> {
        let partitions = self.logs.get_mut(&record.topic).ok_or_else(|| {
            ErrorResponse::new(ErrorCode::UnknownTopic, record.topic.clone())
        })?;
        let partition = 0u32;
        let log = partitions
            .first_mut()
            .ok_or_else(|| ErrorResponse::new(ErrorCode::UnknownTopic, "topic has no partitions"))?;
        let offset = log.len() as u64;
        record.partition = partition;
        record.offset = offset;
        log.push(record);
        Ok(ProduceAck { partition, offset })
    }

    fn check_member(&self, member_id: &str, generation: u32) -> Result<(), ErrorResponse> {
        match self.members.get(member_id) {
            None => Err(ErrorResponse::new(ErrorCode::UnknownMember, member_id)),
            Some(g) if *g != generation => Err(ErrorResponse::new(
                ErrorCode::IllegalGeneration,
                format!("generation {generation} is stale"),
            )),
            Some(_) => Ok(()),
        }
    }

    fn handle(&mut self, req: RequestPayload) -> Result<ResponsePayload, ErrorResponse> {
        let invalid = |e: ProtocolError| ErrorResponse::new(ErrorCode::InvalidRequest, e.to_string());
        let data = match req.op_code {
            OpCode::Produce => {
                let produce = ProduceRequest::deserialize(req.data).map_err(invalid)?;
                self.append(produce.record)?.serialize()
            }
            OpCode::Fetch => {
                let fetch = FetchRequest::deserialize(req.data).map_err(invalid)?;
                if let Some(code) = self.fail_next_fetch.take() {
                    return Err(ErrorResponse::new(code, "injected"));
                }
                self.check_member(&fetch.member_id, fetch.generation)?;
                // a deleted topic forces the group to rebalance
                let log = self
                    .logs
                    .get(&fetch.topic)
                    .and_then(|p| p.get(fetch.partition as usize))
                    .ok_or_else(|| {
                        ErrorResponse::new(ErrorCode::RebalanceInProgress, fetch.topic.clone())
                    })?;
                let records = log
                    .iter()
                    .skip(fetch.offset as usize)
                    .take(fetch.max_records as usize)
                    .cloned()
                    .collect();
                FetchResponse { records }.serialize()
            }
            OpCode::JoinGroup => {
                let join = JoinGroupRequest::deserialize(req.data).map_err(invalid)?;
                self.generation += 1;
                let member_id = match &join.instance_id {
                    Some(instance) => format!("{}-{instance}", join.group),
                    None => format!("{}-member-{}", join.group, self.generation),
                };
                self.members.insert(member_id.clone(), self.generation);

                let mut assignments = Vec::new();
                for topic in &join.topics {
                    let Some(partitions) = self.logs.get(topic) else {
                        continue;
                    };
                    for (partition, log) in partitions.iter().enumerate() {
                        let partition = partition as u32;
                        assignments.push(Assignment {
                            topic: topic.clone(),
                            partition,
                            committed: self
                                .commits
                                .get(&(join.group.clone(), topic.clone(), partition))
                                .copied(),
                            log_start: 0,
                            log_end: log.len() as u64,
                        });
                    }
                }
                self.joins.push(join);
                JoinAck {
                    member_id,
                    generation: self.generation,
                    assignments,
                }
                .serialize()
            }
            OpCode::CommitOffset => {
                let commit = CommitOffsetRequest::deserialize(req.data).map_err(invalid)?;
                self.check_member(&commit.member_id, commit.generation)?;
                self.commits
                    .insert((commit.group, commit.topic, commit.partition), commit.offset);
                bytes::Bytes::new()
            }
            OpCode::LeaveGroup => {
                let leave = LeaveGroupRequest::deserialize(req.data).map_err(invalid)?;
                self.members.remove(&leave.member_id);
                self.leaves.push(leave);
                bytes::Bytes::new()
            }
            OpCode::Metadata => {
                let metadata = MetadataRequest::deserialize(req.data).map_err(invalid)?;
                let topics = self
                    .logs
                    .iter()
                    .filter(|(name, _)| {
                        metadata
                            .topics
                            .as_ref()
                            .map_or(true, |wanted| wanted.contains(name))
                    })
                    .map(|(name, partitions)| TopicMetadata {
                        name: name.clone(),
                        partitions: partitions.len() as u32,
                    })
                    .collect();
                MetadataResponse { topics }.serialize()
            }
        };
        Ok(ResponsePayload::new(req.op_code, data))
    }
}

/// A single-node broker speaking the wire protocol, state kept in memory.
pub struct TestBroker {
    pub addr: String,
    pub state: Arc<Mutex<BrokerState>>,
    listener: JoinHandle<()>,
}

impl TestBroker {
    pub async fn start() -> TestBroker {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(BrokerState::default()));

        let shared = Arc::clone(&state);
        let listener = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(socket, state).await;
                });
            }
        });

        TestBroker {
            addr,
            state,
            listener,
        }
    }

    pub fn create_topic(&self, name: &str, partitions: u32) {
        self.state
            .lock()
            .logs
            .insert(name.to_string(), vec![Vec::new(); partitions as usize]);
    }

    pub fn delete_topic(&self, name: &str) {
        self.state.lock().logs.remove(name);
    }

    /// Appends to partition 0.
    pub fn append(&self, topic: &str, value: &str) -> u64 {
        let mut state = self.state.lock();
        let log = &mut state.logs.get_mut(topic).expect("topic exists")[0];
        let offset = log.len() as u64;
        log.push(WireRecord {
            topic: topic.to_string(),
            offset,
            value: value.as_bytes().to_vec(),
            ..Default::default()
        });
        offset
    }

    pub fn records(&self, topic: &str) -> Vec<WireRecord> {
        self.state
            .lock()
            .logs
            .get(topic)
            .map(|p| p.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.state
            .lock()
            .commits
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    pub fn fail_next_fetch(&self, code: ErrorCode) {
        self.state.lock().fail_next_fetch = Some(code);
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<BrokerState>>) -> Result<(), ProtocolError> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        while let Some(frame) = Frame::decode(&mut buf)? {
            if frame.frame_type != FrameType::Request {
                continue;
            }
            let reply = match RequestPayload::deserialize(frame.payload) {
                Ok(req) => state.lock().handle(req),
                Err(e) => Err(ErrorResponse::new(ErrorCode::InvalidRequest, e.to_string())),
            };
            let out_frame = match reply {
                Ok(payload) => Frame::new(FrameType::Response, frame.correlation_id, payload.serialize()),
                Err(err) => Frame::new(FrameType::Error, frame.correlation_id, err.serialize()),
            };

            let mut out = BytesMut::new();
            out_frame.encode(&mut out);
            stream.write_all(&out).await?;
            stream.flush().await?;
        }
    }
}
