use super::{TopicPatterns, TopicResolver};
use crate::error::DiscoveryError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Asks one or more discovery endpoints for their topics and takes the union.
pub struct HttpResolver {
    client: reqwest::Client,
    urls: Vec<String>,
    patterns: TopicPatterns,
    interval: Duration,
}

impl HttpResolver {
    /// `endpoints` are `host:port` pairs or full base URLs.
    pub fn new(
        endpoints: &[String],
        patterns: TopicPatterns,
        request_timeout: Duration,
        interval: Duration,
    ) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(DiscoveryError::HttpClient)?;

        Ok(HttpResolver {
            client,
            urls: endpoints.iter().map(|e| topics_url(e)).collect(),
            patterns,
            interval,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<String>, DiscoveryError> {
        let wrap = |source| DiscoveryError::Http {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(wrap)?
            .error_for_status()
            .map_err(wrap)?;
        response.json().await.map_err(wrap)
    }
}

fn topics_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.contains("://") {
        format!("{base}/topics")
    } else {
        format!("http://{base}/topics")
    }
}

#[async_trait]
impl TopicResolver for HttpResolver {
    async fn resolve(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut catalog = Vec::new();
        let mut reached = 0usize;

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(topics) => {
                    debug!(url = %url, count = topics.len(), "fetched topics");
                    reached += 1;
                    catalog.extend(topics);
                }
                Err(e) => warn!(error = %e, "skipping topic endpoint"),
            }
        }

        if reached == 0 {
            return Err(DiscoveryError::AllSourcesFailed);
        }
        Ok(self.patterns.filter(catalog))
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
