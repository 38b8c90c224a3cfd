use super::TopicResolver;
use crate::error::DiscoveryError;
use async_trait::async_trait;
use std::time::Duration;

/// A fixed topic list, for consumers of known topics.
pub struct StaticResolver {
    topics: Vec<String>,
    interval: Duration,
}

impl StaticResolver {
    pub fn new<S: Into<String>>(topics: impl IntoIterator<Item = S>, interval: Duration) -> Self {
        let mut topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        topics.sort();
        topics.dedup();
        StaticResolver { topics, interval }
    }
}

#[async_trait]
impl TopicResolver for StaticResolver {
    async fn resolve(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.topics.clone())
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
