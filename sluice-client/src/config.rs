use crate::trace::TraceIdentity;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// Where the resolver gets its topic catalog from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discovery {
    /// Ask the brokers for topic metadata.
    Metadata,
    /// `GET http://{endpoint}/topics` on every endpoint, each returning a JSON array of names.
    Http { endpoints: Vec<String> },
    /// Treat `subscribe` as literal topic names.
    Static,
}

/// Where a group without a committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialOffset {
    Oldest,
    Newest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub brokers: Vec<String>,
    pub group: String,
    /// Static group membership id.
    pub instance_id: Option<String>,
    /// Regex patterns, or literal topics with `Discovery::Static`.
    pub subscribe: Vec<String>,
    pub discovery: Discovery,
    /// Overrides the discovery strategy's own tick.
    pub discovery_interval_ms: Option<u64>,
    pub initial_offset: InitialOffset,

    pub queue_capacity: usize,
    pub fetch_interval_ms: u64,
    pub fetch_max_records: u32,
    pub request_timeout_ms: u64,
    pub http_timeout_ms: u64,

    pub idle_poll_ms: u64,
    pub restart_backoff_ms: u64,
    pub close_timeout_ms: u64,
    pub report_interval_ms: u64,

    /// Offer one empty record per newly discovered topic to the application.
    pub greeter: bool,
    /// Keep restarting after errors that are not known to be transient.
    pub retry_on_fatal: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            group: String::new(),
            instance_id: None,
            subscribe: Vec::new(),
            discovery: Discovery::Metadata,
            discovery_interval_ms: None,
            initial_offset: InitialOffset::Oldest,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fetch_interval_ms: 100,
            fetch_max_records: 500,
            request_timeout_ms: 5_000,
            http_timeout_ms: 5_000,
            idle_poll_ms: 1_000,
            restart_backoff_ms: 10_000,
            close_timeout_ms: 5_000,
            report_interval_ms: 10_000,
            greeter: false,
            retry_on_fatal: false,
        }
    }
}

impl ConsumerConfig {
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => read_toml(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.brokers.is_empty() {
            return Err("at least one broker address is required".into());
        }
        if self.group.is_empty() {
            return Err("group must not be empty".into());
        }
        if self.subscribe.is_empty() {
            return Err("nothing to subscribe to".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be positive".into());
        }
        if let Discovery::Http { endpoints } = &self.discovery {
            if endpoints.is_empty() {
                return Err("http discovery needs at least one endpoint".into());
            }
        }
        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        let default_ms = match self.discovery {
            Discovery::Metadata => 5_000,
            Discovery::Http { .. } | Discovery::Static => 1_000,
        };
        Duration::from_millis(self.discovery_interval_ms.unwrap_or(default_ms).max(1))
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Never more than a second, so a consumer notices its first topics promptly.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.clamp(1, 1_000))
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub queue_capacity: usize,
    pub request_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub identity: TraceIdentity,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["127.0.0.1:9092".to_string()],
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout_ms: 5_000,
            close_timeout_ms: 5_000,
            identity: TraceIdentity::default(),
        }
    }
}

impl ProducerConfig {
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => read_toml(p),
            None => Ok(Self::default()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

fn read_toml<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let raw =
        fs::read_to_string(&path).with_context(|| format!("reading {:?}", path.as_ref()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {:?} as TOML", path.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_observed_constants() {
        let cfg = ConsumerConfig::default();
        assert_eq!(cfg.queue_capacity, 100_000);
        assert_eq!(cfg.close_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.http_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.discovery_interval(), Duration::from_secs(5));
        assert!(!cfg.retry_on_fatal);
    }

    #[test]
    fn test_idle_poll_is_capped() {
        let cfg = ConsumerConfig {
            idle_poll_ms: 30_000,
            ..Default::default()
        };
        assert_eq!(cfg.idle_poll(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
brokers = ["10.0.0.1:9092", "10.0.0.2:9092"]
group = "analytics"
subscribe = ["orders", "ship.*"]
greeter = true

[discovery]
kind = "http"
endpoints = ["10.0.0.1:8082"]
"#
        )
        .unwrap();

        let cfg = ConsumerConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(cfg.brokers.len(), 2);
        assert_eq!(cfg.group, "analytics");
        assert!(cfg.greeter);
        assert_eq!(
            cfg.discovery,
            Discovery::Http {
                endpoints: vec!["10.0.0.1:8082".into()]
            }
        );
        assert_eq!(cfg.discovery_interval(), Duration::from_secs(1));
        assert_eq!(cfg.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ConsumerConfig::load_or_default(Some("/definitely/not/here.toml")).is_err());
        assert!(ConsumerConfig::load_or_default(None::<&Path>).is_ok());
    }

    #[test]
    fn test_validate_rejects_incomplete_config() {
        let cfg = ConsumerConfig::default();
        assert!(cfg.validate().unwrap_err().contains("group"));

        let cfg = ConsumerConfig {
            group: "g".into(),
            subscribe: vec!["t".into()],
            discovery: Discovery::Http {
                endpoints: Vec::new(),
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
