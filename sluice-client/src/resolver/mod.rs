//! Turning subscription patterns into the concrete topic list a session consumes.

mod fixed;
mod http;
mod metadata;

pub use fixed::StaticResolver;
pub use http::HttpResolver;
pub use metadata::MetadataResolver;

use crate::envelope::Envelope;
use crate::error::DiscoveryError;
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Compiled subscription patterns. A topic matches if any pattern finds a match in it.
#[derive(Debug, Clone)]
pub struct TopicPatterns {
    patterns: Vec<Regex>,
}

impl TopicPatterns {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, DiscoveryError> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TopicPatterns { patterns })
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(topic))
    }

    /// Sorted, deduplicated subset of `topics` matching at least one pattern.
    pub fn filter<I, S>(&self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        topics
            .into_iter()
            .map(Into::into)
            .filter(|t| self.matches(t))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// A source of the desired topic list.
#[async_trait]
pub trait TopicResolver: Send + Sync {
    /// Sorted and deduplicated.
    async fn resolve(&self) -> Result<Vec<String>, DiscoveryError>;

    fn interval(&self) -> Duration;

    fn name(&self) -> &'static str;
}

/// Topics added and removed between two published sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TopicDelta {
    pub fn diff(old: &[String], new: &[String]) -> TopicDelta {
        let old: BTreeSet<&String> = old.iter().collect();
        let new: BTreeSet<&String> = new.iter().collect();
        TopicDelta {
            added: new.difference(&old).map(|t| t.to_string()).collect(),
            removed: old.difference(&new).map(|t| t.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The current topic list: one writer (the resolver loop), many readers.
#[derive(Debug, Default)]
pub struct TopicSet {
    topics: RwLock<Vec<String>>,
    changed: Notify,
}

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.topics.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }

    /// Replaces the set if it differs as a set from the current one.
    pub fn publish(&self, topics: Vec<String>) -> Option<TopicDelta> {
        let mut current = self.topics.write();
        let delta = TopicDelta::diff(&current, &topics);
        if delta.is_empty() {
            return None;
        }
        let mut topics = topics;
        topics.sort();
        topics.dedup();
        *current = topics;
        drop(current);

        self.changed.notify_one();
        Some(delta)
    }

    /// Completes after the next successful [`publish`](Self::publish), or
    /// immediately if one happened since the last wait.
    pub async fn changed(&self) {
        self.changed.notified().await
    }
}

/// Runs `resolver` on its interval and publishes into `topics` until cancelled.
///
/// A failed resolution leaves the previous set in place.
pub async fn watch_topics(
    resolver: Arc<dyn TopicResolver>,
    topics: Arc<TopicSet>,
    greeter: Option<mpsc::Sender<Envelope>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(resolver.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            resolved = resolver.resolve() => resolved,
        };
        match resolved {
            Ok(resolved) => {
                if let Some(delta) = topics.publish(resolved) {
                    info!(
                        resolver = resolver.name(),
                        added = ?delta.added,
                        removed = ?delta.removed,
                        "topic set changed"
                    );
                    if let Some(greeter) = &greeter {
                        greet(greeter, &delta.added);
                    }
                }
            }
            Err(e) => warn!(resolver = resolver.name(), error = %e, "topic resolution failed, keeping previous set"),
        }
    }
    debug!(resolver = resolver.name(), "topic watcher stopped");
}

fn greet(incoming: &mpsc::Sender<Envelope>, added: &[String]) {
    for topic in added {
        match incoming.try_send(Envelope::new(topic.as_str(), Vec::new())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!(topic = %topic, "incoming full, greeting dropped"),
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filter_sorts_and_dedups() {
        let patterns = TopicPatterns::compile(&["orders", "ship.*"]).unwrap();
        let topics = patterns.filter(["shipments", "orders", "payments", "orders", "shipped"]);
        assert_eq!(topics, names(&["orders", "shipments", "shipped"]));
    }

    #[test]
    fn test_bad_pattern_is_a_construction_error() {
        let err = TopicPatterns::compile(&["orders", "ship(("]).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern(_)));
    }

    #[test]
    fn test_any_difference_is_a_delta() {
        let delta = TopicDelta::diff(&names(&["A", "B"]), &names(&["A", "C"]));
        assert_eq!(delta.added, names(&["C"]));
        assert_eq!(delta.removed, names(&["B"]));
    }

    #[test]
    fn test_publish_ignores_order() {
        let set = TopicSet::new();
        assert!(set.publish(names(&["b", "a"])).is_some());
        assert_eq!(set.snapshot(), names(&["a", "b"]));
        assert!(set.publish(names(&["a", "b"])).is_none());
        assert!(set.publish(names(&["a"])).is_some());
    }

    struct Scripted {
        answers: Mutex<Vec<Result<Vec<String>, DiscoveryError>>>,
    }

    #[async_trait]
    impl TopicResolver for Scripted {
        async fn resolve(&self) -> Result<Vec<String>, DiscoveryError> {
            let mut answers = self.answers.lock();
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                match answers.first() {
                    Some(Ok(topics)) => Ok(topics.clone()),
                    _ => Err(DiscoveryError::AllSourcesFailed),
                }
            }
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_failed_resolution_keeps_stale_set_and_greets_new_topics() {
        let resolver = Arc::new(Scripted {
            answers: Mutex::new(vec![
                Ok(names(&["orders"])),
                Err(DiscoveryError::AllSourcesFailed),
                Ok(names(&["orders", "shipments"])),
                Err(DiscoveryError::AllSourcesFailed),
            ]),
        });
        let topics = Arc::new(TopicSet::new());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(watch_topics(resolver, topics.clone(), Some(tx), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(topics.snapshot(), names(&["orders", "shipments"]));
        let greeted: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| {
                assert!(e.value.is_empty());
                e.topic
            })
            .collect();
        assert_eq!(greeted, names(&["orders", "shipments"]));
    }
}
