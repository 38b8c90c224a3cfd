use crate::envelope::Envelope;
use crate::error::SessionError;
use crate::pipeline::{MarkQueue, RecordHandler, Stats};
use crate::resolver::{TopicDelta, TopicSet};
use crate::session::{BrokerSession, SessionFactory};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause between one session ending and the next starting.
const CYCLE_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first topics.
    Idle,
    Starting,
    Consuming,
    /// Closing the outgoing session.
    Draining,
    Stopped,
}

#[derive(Debug)]
pub(crate) struct Status {
    running: AtomicBool,
    state: Mutex<SessionState>,
}

impl Status {
    pub(crate) fn new() -> Self {
        Status {
            running: AtomicBool::new(false),
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn enter(&self, state: SessionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(from = ?*current, to = ?state, "session state");
            *current = state;
        }
    }
}

/// Owns the session slot: at most one broker session exists at a time, and
/// it is fully closed before the next one is created.
pub(crate) struct Coordinator {
    pub(crate) factory: Arc<dyn SessionFactory>,
    pub(crate) topics: Arc<TopicSet>,
    pub(crate) incoming: mpsc::Sender<Envelope>,
    pub(crate) marks: MarkQueue,
    pub(crate) stats: Arc<Stats>,
    pub(crate) status: Arc<Status>,
    pub(crate) idle_poll: Duration,
    pub(crate) restart_backoff: Duration,
    pub(crate) retry_on_fatal: bool,
    pub(crate) shutdown: CancellationToken,
}

impl Coordinator {
    /// Runs sessions until shutdown or a fatal error.
    ///
    /// Returns the outcome of the last session close.
    pub(crate) async fn run(mut self) -> Result<(), SessionError> {
        let mut last_close = Ok(());

        while !self.shutdown.is_cancelled() {
            self.status.enter(SessionState::Idle);
            let topics = self.topics.snapshot();
            if topics.is_empty() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = self.topics.changed() => {}
                    _ = tokio::time::sleep(self.idle_poll) => {}
                }
                continue;
            }

            self.status.enter(SessionState::Starting);
            let created = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                created = self.factory.create() => created,
            };
            let mut session = match created {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, backoff = ?self.restart_backoff, "creating broker session failed");
                    if !self.pause(self.restart_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            let outcome = self.consume(session.as_mut(), &topics).await;

            self.status.enter(SessionState::Draining);
            last_close = session.close().await;
            if let Err(e) = &last_close {
                warn!(error = %e, "closing broker session failed");
            }
            drop(session);

            match outcome {
                Ok(()) => debug!("session cancelled"),
                Err(e) if e.is_transient() => info!(error = %e, "session ended, starting a new one"),
                Err(e) if self.retry_on_fatal => {
                    error!(error = %e, backoff = ?self.restart_backoff, "session failed, retrying");
                    if !self.pause(self.restart_backoff).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "session failed, consumer stopping");
                    break;
                }
            }
            if !self.pause(CYCLE_PAUSE).await {
                break;
            }
        }

        // stops the topic watcher and reporter after a fatal exit
        self.shutdown.cancel();
        self.status.set_running(false);
        self.status.enter(SessionState::Stopped);
        info!("session coordinator stopped");
        last_close
    }

    // returns when the session does; cancels it on any topic-set delta
    async fn consume(
        &mut self,
        session: &mut dyn BrokerSession,
        topics: &[String],
    ) -> Result<(), SessionError> {
        let cancel = self.shutdown.child_token();
        let mut handler = RecordHandler::new(self.incoming.clone(), &mut self.marks, &self.stats);

        self.status.enter(SessionState::Consuming);
        info!(topics = ?topics, "session consuming");

        let consume = session.consume(&cancel, topics, &mut handler);
        tokio::pin!(consume);

        loop {
            tokio::select! {
                result = &mut consume => return result,
                _ = self.topics.changed(), if !cancel.is_cancelled() => {
                    let delta = TopicDelta::diff(topics, &self.topics.snapshot());
                    if !delta.is_empty() {
                        info!(added = ?delta.added, removed = ?delta.removed, "restarting session for new topic set");
                        cancel.cancel();
                    }
                }
            }
        }
    }

    /// False if shutdown was requested while waiting.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
