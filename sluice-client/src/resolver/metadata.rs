use super::{TopicPatterns, TopicResolver};
use crate::connection::Connection;
use crate::error::DiscoveryError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Reads the topic catalog from the brokers' metadata.
pub struct MetadataResolver {
    brokers: Vec<String>,
    patterns: TopicPatterns,
    request_timeout: Duration,
    interval: Duration,
    conn: Mutex<Option<Connection>>,
}

impl MetadataResolver {
    pub fn new(
        brokers: Vec<String>,
        patterns: TopicPatterns,
        request_timeout: Duration,
        interval: Duration,
    ) -> Self {
        MetadataResolver {
            brokers,
            patterns,
            request_timeout,
            interval,
            conn: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TopicResolver for MetadataResolver {
    async fn resolve(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => Connection::connect_any(&self.brokers, self.request_timeout).await?,
        };

        let catalog = match conn.metadata(None).await {
            Ok(catalog) => catalog,
            Err(e) => {
                debug!(broker = %conn.addr(), error = %e, "dropping metadata connection");
                return Err(e.into());
            }
        };
        *slot = Some(conn);

        Ok(self.patterns.filter(
            catalog
                .into_iter()
                .filter(|t| t.partitions > 0)
                .map(|t| t.name),
        ))
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "metadata"
    }
}
