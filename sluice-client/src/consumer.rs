use crate::config::{ConsumerConfig, Discovery};
use crate::coordinator::{Coordinator, SessionState, Status};
use crate::envelope::Envelope;
use crate::error::{ConsumerError, SessionError};
use crate::pipeline::{MarkQueue, Messages, Pipeline};
use crate::resolver::{
    watch_topics, HttpResolver, MetadataResolver, StaticResolver, TopicPatterns, TopicResolver,
    TopicSet,
};
use crate::session::{SessionFactory, TcpSessionFactory};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct Tasks {
    shutdown: CancellationToken,
    coordinator: JoinHandle<Result<(), SessionError>>,
    watcher: JoinHandle<()>,
    reporter: JoinHandle<()>,
}

/// A group consumer that follows a changing topic set.
///
/// Records arrive through [`get_message`](Self::get_message) or
/// [`messages`](Self::messages) and are acknowledged explicitly with
/// [`mark_message`](Self::mark_message). Delivery is at least once.
pub struct Consumer {
    config: ConsumerConfig,
    resolver: Arc<dyn TopicResolver>,
    factory: Arc<dyn SessionFactory>,
    topics: Arc<TopicSet>,
    pipeline: Arc<Pipeline>,
    marks: Mutex<Option<MarkQueue>>,
    status: Arc<Status>,
    tasks: Mutex<Option<Tasks>>,
}

impl Consumer {
    pub fn new(
        config: ConsumerConfig,
        resolver: Arc<dyn TopicResolver>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let (pipeline, marks) = Pipeline::new(config.queue_capacity.max(1));
        Consumer {
            config,
            resolver,
            factory,
            topics: Arc::new(TopicSet::new()),
            pipeline: Arc::new(pipeline),
            marks: Mutex::new(Some(marks)),
            status: Arc::new(Status::new()),
            tasks: Mutex::new(None),
        }
    }

    /// Builds the resolver and TCP session factory described by `config`.
    ///
    /// Fails on invalid configuration, a bad pattern, or when no broker is reachable.
    pub async fn connect(config: ConsumerConfig) -> Result<Self, ConsumerError> {
        config.validate().map_err(ConsumerError::Config)?;

        let interval = config.discovery_interval();
        let resolver: Arc<dyn TopicResolver> = match &config.discovery {
            Discovery::Metadata => Arc::new(MetadataResolver::new(
                config.brokers.clone(),
                TopicPatterns::compile(&config.subscribe)?,
                config.request_timeout(),
                interval,
            )),
            Discovery::Http { endpoints } => Arc::new(HttpResolver::new(
                endpoints,
                TopicPatterns::compile(&config.subscribe)?,
                config.http_timeout(),
                interval,
            )?),
            Discovery::Static => Arc::new(StaticResolver::new(config.subscribe.clone(), interval)),
        };

        let factory = TcpSessionFactory::from_config(&config);
        factory.probe().await?;

        Ok(Self::new(config, resolver, Arc::new(factory)))
    }

    /// Spawns the topic watcher, the session coordinator and the reporter.
    ///
    /// Must be called from within a Tokio runtime. Starting a running
    /// consumer does nothing; a closed consumer cannot be restarted.
    pub fn start(&self, parent: &CancellationToken) -> Result<(), ConsumerError> {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return Ok(());
        }
        let marks = self.marks.lock().take().ok_or(ConsumerError::Closed)?;

        let shutdown = parent.child_token();
        self.status.set_running(true);

        let coordinator = Coordinator {
            factory: Arc::clone(&self.factory),
            topics: Arc::clone(&self.topics),
            incoming: self.pipeline.incoming_sender(),
            marks,
            stats: self.pipeline.stats(),
            status: Arc::clone(&self.status),
            idle_poll: self.config.idle_poll(),
            restart_backoff: self.config.restart_backoff(),
            retry_on_fatal: self.config.retry_on_fatal,
            shutdown: shutdown.clone(),
        };
        let greeter = self.config.greeter.then(|| self.pipeline.incoming_sender());

        *tasks = Some(Tasks {
            coordinator: tokio::spawn(coordinator.run()),
            watcher: tokio::spawn(watch_topics(
                Arc::clone(&self.resolver),
                Arc::clone(&self.topics),
                greeter,
                shutdown.clone(),
            )),
            reporter: tokio::spawn(report(
                Arc::clone(&self.pipeline),
                Arc::clone(&self.topics),
                Arc::clone(&self.status),
                self.config.report_interval(),
                shutdown.clone(),
            )),
            shutdown,
        });
        info!(group = %self.config.group, resolver = self.resolver.name(), "consumer started");
        Ok(())
    }

    /// Stops every loop and closes the live session.
    ///
    /// Waits at most `close_timeout` for the session; past that the session
    /// is abandoned and this returns anyway.
    pub async fn close(&self) -> Result<(), ConsumerError> {
        self.pipeline.close();
        self.marks.lock().take();
        let Some(tasks) = self.tasks.lock().take() else {
            return Ok(());
        };
        self.status.set_running(false);
        tasks.shutdown.cancel();
        tasks.watcher.abort();
        tasks.reporter.abort();

        let timeout = self.config.close_timeout();
        let mut coordinator = tasks.coordinator;
        match tokio::time::timeout(timeout, &mut coordinator).await {
            Ok(Ok(closed)) => closed.map_err(ConsumerError::from),
            Ok(Err(e)) => Err(SessionError::Other(format!("coordinator task failed: {e}")).into()),
            Err(_) => {
                warn!(?timeout, "session did not close in time, abandoning it");
                // drops the to-mark receiver so later marks fail fast
                coordinator.abort();
                Ok(())
            }
        }
    }

    /// False after `close`, or once a fatal session error stopped the consumer.
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// True while a session is consuming.
    pub fn is_ready(&self) -> bool {
        self.status.state() == SessionState::Consuming
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// Never blocks.
    pub fn get_message(&self) -> Option<Envelope> {
        self.pipeline.try_next()
    }

    /// Blocking access to incoming records; ends once the consumer is closed and drained.
    pub async fn messages(&self) -> Messages {
        self.pipeline.messages().await
    }

    pub async fn mark_message(&self, envelope: Envelope) -> Result<(), ConsumerError> {
        self.pipeline
            .mark(envelope)
            .await
            .map_err(|_| ConsumerError::Closed)
    }

    pub async fn mark_messages<I>(&self, envelopes: I) -> Result<(), ConsumerError>
    where
        I: IntoIterator<Item = Envelope>,
    {
        for envelope in envelopes {
            self.mark_message(envelope).await?;
        }
        Ok(())
    }

    /// `(marked, consumed)`.
    pub fn stats(&self) -> (u64, u64) {
        let stats = self.pipeline.stats();
        (stats.marked(), stats.consumed())
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.snapshot()
    }
}

async fn report(
    pipeline: Arc<Pipeline>,
    topics: Arc<TopicSet>,
    status: Arc<Status>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let stats = pipeline.stats();
        let ((incoming, incoming_cap), (to_mark, to_mark_cap)) = pipeline.fill_levels();
        info!(
            consumed = stats.consumed(),
            marked = stats.marked(),
            incoming = %format!("{incoming}/{incoming_cap}"),
            to_mark = %format!("{to_mark}/{to_mark_cap}"),
            topics = topics.snapshot().len(),
            state = ?status.state(),
            "consumer stats"
        );
    }
}
