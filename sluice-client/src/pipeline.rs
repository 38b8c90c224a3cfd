//! Bounded hand-off between the broker session and the application.
//!
//! Two FIFO queues: `incoming` carries envelopes from the live session to the
//! application, `to-mark` carries envelopes the application has finished
//! with back to the session for acknowledgement. Both block the pushing side
//! when full, which is what throttles the broker when the application lags.

use crate::envelope::Envelope;
use crate::error::SessionError;
use sluice_protocol::WireRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Counters written only by the record handler of the live session.
#[derive(Debug, Default)]
pub struct Stats {
    consumed: AtomicU64,
    marked: AtomicU64,
}

impl Stats {
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    pub fn marked(&self) -> u64 {
        self.marked.load(Ordering::Relaxed)
    }
}

pub struct Pipeline {
    incoming_tx: mpsc::Sender<Envelope>,
    incoming_rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    to_mark_tx: mpsc::Sender<Envelope>,
    stats: Arc<Stats>,
    closed: CancellationToken,
}

/// The receiving end of `to-mark`, owned by whoever runs sessions.
pub type MarkQueue = mpsc::Receiver<Envelope>;

impl Pipeline {
    pub fn new(capacity: usize) -> (Pipeline, MarkQueue) {
        let (incoming_tx, incoming_rx) = mpsc::channel(capacity);
        let (to_mark_tx, to_mark_rx) = mpsc::channel(capacity);
        let pipeline = Pipeline {
            incoming_tx,
            incoming_rx: Arc::new(Mutex::new(incoming_rx)),
            to_mark_tx,
            stats: Arc::new(Stats::default()),
            closed: CancellationToken::new(),
        };
        (pipeline, to_mark_rx)
    }

    pub fn incoming_sender(&self) -> mpsc::Sender<Envelope> {
        self.incoming_tx.clone()
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Returns an envelope only if one is immediately available.
    ///
    /// Also returns `None` while a [`Messages`] handle holds the queue.
    pub fn try_next(&self) -> Option<Envelope> {
        let mut rx = self.incoming_rx.try_lock().ok()?;
        match rx.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub async fn messages(&self) -> Messages {
        Messages {
            rx: Arc::clone(&self.incoming_rx).lock_owned().await,
            closed: self.closed.clone(),
        }
    }

    pub async fn mark(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.to_mark_tx.send(envelope).await.map_err(|e| e.0)
    }

    /// After this, [`Messages::next`] drains what is queued and then ends.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// `(queued, capacity)` for `incoming` and `to-mark`.
    pub fn fill_levels(&self) -> ((usize, usize), (usize, usize)) {
        (level(&self.incoming_tx), level(&self.to_mark_tx))
    }
}

fn level(tx: &mpsc::Sender<Envelope>) -> (usize, usize) {
    let max = tx.max_capacity();
    (max - tx.capacity(), max)
}

/// Exclusive blocking access to `incoming`.
pub struct Messages {
    rx: OwnedMutexGuard<mpsc::Receiver<Envelope>>,
    closed: CancellationToken,
}

impl Messages {
    /// Waits for the next envelope; `None` once the pipeline is closed and drained.
    pub async fn next(&mut self) -> Option<Envelope> {
        tokio::select! {
            biased;
            envelope = self.rx.recv() => envelope,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }
}

/// Outcome of [`RecordHandler::offer`].
#[derive(Debug)]
pub enum Offer {
    Delivered,
    /// A mark arrived while `incoming` was full; the record is handed back undelivered.
    Marked { mark: Envelope, record: WireRecord },
}

/// Per-session bridge between a broker session and the pipeline.
///
/// Sessions hand it every record they receive, in order, and ask it for the
/// envelopes the application wants acknowledged.
pub struct RecordHandler<'a> {
    incoming: mpsc::Sender<Envelope>,
    marks: &'a mut MarkQueue,
    stats: &'a Stats,
}

impl<'a> RecordHandler<'a> {
    pub fn new(incoming: mpsc::Sender<Envelope>, marks: &'a mut MarkQueue, stats: &'a Stats) -> Self {
        RecordHandler {
            incoming,
            marks,
            stats,
        }
    }

    /// Pushes one record to `incoming`, waiting while the queue is full.
    pub async fn deliver(&mut self, record: WireRecord) -> Result<(), SessionError> {
        self.incoming
            .send(Envelope::from(record))
            .await
            .map_err(|_| SessionError::Cancelled)?;
        self.stats.consumed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Like [`deliver`](Self::deliver), but gives up waiting for space as soon
    /// as a mark is queued, so the caller can commit it and offer again.
    pub async fn offer(&mut self, record: WireRecord) -> Result<Offer, SessionError> {
        tokio::select! {
            biased;
            permit = self.incoming.reserve() => {
                let permit = permit.map_err(|_| SessionError::Cancelled)?;
                permit.send(Envelope::from(record));
                self.stats.consumed.fetch_add(1, Ordering::Relaxed);
                Ok(Offer::Delivered)
            }
            Some(mark) = self.marks.recv() => Ok(Offer::Marked { mark, record }),
        }
    }

    /// Waits for the next envelope to acknowledge.
    pub async fn next_mark(&mut self) -> Option<Envelope> {
        self.marks.recv().await
    }

    pub fn try_next_mark(&mut self) -> Option<Envelope> {
        self.marks.try_recv().ok()
    }

    /// Counts one processed mark, whether or not it moved a committed offset.
    pub fn acknowledged(&self) {
        self.stats.marked.fetch_add(1, Ordering::Relaxed);
    }
}
