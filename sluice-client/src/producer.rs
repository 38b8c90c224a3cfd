use crate::config::ProducerConfig;
use crate::connection::Connection;
use crate::envelope::Envelope;
use crate::error::{ClientError, ProducerError};
use crate::trace::{self, TraceIdentity};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Counters {
    produced: AtomicU64,
    errored: AtomicU64,
}

/// Fire-and-forget publisher. Envelopes are trace-stamped and sent by a
/// background task; failures only show up in the errored counter.
pub struct Producer {
    queue: mpsc::Sender<Envelope>,
    counters: Arc<Counters>,
    closed: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl Producer {
    /// Fails when no broker is reachable.
    pub async fn connect(config: ProducerConfig) -> Result<Self, ProducerError> {
        if config.brokers.is_empty() {
            return Err(ProducerError::Config(
                "at least one broker address is required".into(),
            ));
        }
        let request_timeout = config.request_timeout();
        let close_timeout = config.close_timeout();
        let conn = Connection::connect_any(&config.brokers, request_timeout).await?;

        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let closed = CancellationToken::new();

        let sender = Sender {
            conn: Some(conn),
            brokers: config.brokers,
            request_timeout,
            identity: config.identity,
            counters: Arc::clone(&counters),
            rx,
            closed: closed.clone(),
        };
        let task = tokio::spawn(sender.run());

        Ok(Producer {
            queue,
            counters,
            closed,
            task: Mutex::new(Some(task)),
            close_timeout,
        })
    }

    /// Queues one envelope, waiting only while the queue is full.
    pub async fn send_message(&self, envelope: Envelope) -> Result<(), ProducerError> {
        if self.closed.is_cancelled() {
            return Err(ProducerError::Closed);
        }
        self.queue
            .send(envelope)
            .await
            .map_err(|_| ProducerError::Closed)?;
        self.counters.produced.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stops intake and gives queued envelopes `close_timeout` to go out.
    pub async fn close(&self) -> Result<(), ProducerError> {
        self.closed.cancel();
        let Some(task) = self.task.lock().take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.close_timeout, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(error = %e, "producer task failed");
                Ok(())
            }
            Err(_) => {
                warn!(timeout = ?self.close_timeout, "producer did not flush in time");
                Ok(())
            }
        }
    }

    /// `(produced, errored)`.
    pub fn produced_messages(&self) -> (u64, u64) {
        (
            self.counters.produced.load(Ordering::Relaxed),
            self.counters.errored.load(Ordering::Relaxed),
        )
    }
}

struct Sender {
    conn: Option<Connection>,
    brokers: Vec<String>,
    request_timeout: Duration,
    identity: TraceIdentity,
    counters: Arc<Counters>,
    rx: mpsc::Receiver<Envelope>,
    closed: CancellationToken,
}

impl Sender {
    async fn run(mut self) {
        loop {
            let envelope = tokio::select! {
                biased;
                envelope = self.rx.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
                _ = self.closed.cancelled() => break,
            };
            self.send(envelope).await;
        }

        self.rx.close();
        let mut flushed = 0usize;
        while let Ok(envelope) = self.rx.try_recv() {
            self.send(envelope).await;
            flushed += 1;
        }
        if let Some(conn) = self.conn.as_mut() {
            conn.shutdown().await;
        }
        info!(flushed, "producer stopped");
    }

    async fn send(&mut self, mut envelope: Envelope) {
        if let Err(e) = trace::stamp(&mut envelope.headers, &self.identity) {
            warn!(topic = %envelope.topic, error = %e, "trace stamping failed, sending without this hop");
        }
        let topic = envelope.topic.clone();
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let record = envelope.into_produce_record(timestamp);

        let result = match self.connection().await {
            Ok(conn) => conn.produce(record).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(ack) => debug!(topic = %topic, partition = ack.partition, offset = ack.offset, "produced"),
            Err(e) => {
                self.counters.errored.fetch_add(1, Ordering::Relaxed);
                debug!(topic = %topic, error = %e, "produce failed");
                self.conn = None;
            }
        }
    }

    async fn connection(&mut self) -> Result<&mut Connection, ClientError> {
        if self.conn.is_none() {
            self.conn = Some(Connection::connect_any(&self.brokers, self.request_timeout).await?);
        }
        self.conn.as_mut().ok_or(ClientError::Disconnected)
    }
}
