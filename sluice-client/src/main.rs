use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sluice_client::{Consumer, ConsumerConfig, Discovery, Envelope, Producer, ProducerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sluice", about = "Follow and publish to sluice topics")]
struct Params {
    #[arg(long, env = "SLUICE_LOG_LEVEL", default_value = "info", global = true)]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume matching topics, print each record and mark it
    Tail {
        #[arg(long, env = "SLUICE_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, env = "SLUICE_BROKERS", value_delimiter = ',')]
        brokers: Vec<String>,

        #[arg(long, env = "SLUICE_GROUP")]
        group: Option<String>,

        /// Topic regex; repeatable
        #[arg(long = "subscribe", short = 's')]
        subscribe: Vec<String>,

        /// Discover topics from these HTTP endpoints instead of broker metadata
        #[arg(long = "discovery", value_delimiter = ',')]
        discovery: Vec<String>,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Produce one record
    Send {
        #[arg(long, env = "SLUICE_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, env = "SLUICE_BROKERS", value_delimiter = ',')]
        brokers: Vec<String>,

        #[arg(long, short = 't')]
        topic: String,

        #[arg(long, short = 'k')]
        key: Option<String>,

        /// `name=value`; repeatable
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let params = Params::parse();

    tracing_subscriber::fmt()
        .with_max_level(params.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .compact()
        .init();

    match params.command {
        Command::Tail {
            config,
            brokers,
            group,
            subscribe,
            discovery,
            limit,
        } => {
            let mut cfg = ConsumerConfig::load_or_default(config)?;
            if !brokers.is_empty() {
                cfg.brokers = brokers;
            }
            if let Some(group) = group {
                cfg.group = group;
            }
            if !subscribe.is_empty() {
                cfg.subscribe = subscribe;
            }
            if !discovery.is_empty() {
                cfg.discovery = Discovery::Http {
                    endpoints: discovery,
                };
            }
            tail(cfg, limit).await
        }
        Command::Send {
            config,
            brokers,
            topic,
            key,
            headers,
            value,
        } => {
            let mut cfg = ProducerConfig::load_or_default(config)?;
            if !brokers.is_empty() {
                cfg.brokers = brokers;
            }
            let mut envelope = Envelope::new(topic, value);
            if let Some(key) = key {
                envelope = envelope.with_key(key);
            }
            for header in headers {
                let Some((name, value)) = header.split_once('=') else {
                    bail!("header {header:?} is not name=value");
                };
                envelope = envelope.with_header(name, value);
            }
            send(cfg, envelope).await
        }
    }
}

async fn tail(cfg: ConsumerConfig, limit: Option<u64>) -> Result<()> {
    let consumer = Consumer::connect(cfg).await.context("starting consumer")?;
    let shutdown = CancellationToken::new();
    consumer.start(&shutdown)?;

    let mut messages = consumer.messages().await;
    let mut liveness = tokio::time::interval(Duration::from_secs(1));
    let mut seen = 0u64;
    loop {
        let envelope = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = liveness.tick() => {
                if !consumer.is_running() {
                    break;
                }
                continue;
            }
            envelope = messages.next() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };
        println!(
            "{}[{}]@{} {}",
            envelope.topic,
            envelope.partition,
            envelope.offset,
            String::from_utf8_lossy(&envelope.value)
        );
        consumer.mark_message(envelope).await?;

        seen += 1;
        if limit.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    drop(messages);
    let (marked, consumed) = consumer.stats();
    consumer.close().await?;
    info!(consumed, marked, "tail finished");
    Ok(())
}

async fn send(cfg: ProducerConfig, envelope: Envelope) -> Result<()> {
    let producer = Producer::connect(cfg).await.context("connecting producer")?;
    producer.send_message(envelope).await?;
    producer.close().await?;

    let (produced, errored) = producer.produced_messages();
    if errored > 0 {
        bail!("{errored} of {produced} records failed to send");
    }
    Ok(())
}
