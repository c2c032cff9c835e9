//! Topic-indexed pub/sub fabric. Each topic owns its own bounded broadcast
//! channel; a slow subscriber that falls behind the channel's capacity
//! loses its oldest unread messages and is told so via an out-of-band
//! [`Envelope::Lag`] rather than being disconnected.

mod topic;

pub use topic::Topic;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sentinel_common::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Validates a bearer token presented at connection time. The core only
/// checks presence/shape; verifying it against an identity provider is
/// owned by whatever exposes this broadcaster externally.
pub trait TokenPolicy: Send + Sync {
    fn authorize(&self, token: Option<&str>, topic: &Topic) -> bool;
}

/// Accepts every subscription, anonymous or not. The default until a
/// caller wires in something stricter.
pub struct AcceptAllTokenPolicy;

impl TokenPolicy for AcceptAllTokenPolicy {
    fn authorize(&self, _token: Option<&str>, _topic: &Topic) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub topic: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Envelope {
    Message(Message),
    /// Emitted in place of the messages a lagging subscriber missed.
    Lag { dropped: u64 },
}

struct TopicChannel {
    sender: broadcast::Sender<Envelope>,
    sequence: AtomicU64,
    subscribers: DashMap<String, ()>,
}

impl TopicChannel {
    fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender, sequence: AtomicU64::new(0), subscribers: DashMap::new() }
    }
}

pub struct Broadcaster {
    capacity: usize,
    channels: DashMap<String, TopicChannel>,
    token_policy: Arc<dyn TokenPolicy>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, channels: DashMap::new(), token_policy: Arc::new(AcceptAllTokenPolicy) }
    }

    pub fn with_token_policy(capacity: usize, token_policy: Arc<dyn TokenPolicy>) -> Self {
        Self { capacity, channels: DashMap::new(), token_policy }
    }

    fn channel(&self, topic: &Topic) -> dashmap::mapref::one::RefMut<'_, String, TopicChannel> {
        self.channels.entry(topic.wire_name()).or_insert_with(|| TopicChannel::new(self.capacity))
    }

    pub fn subscribe(&self, connection_id: impl Into<String>, topic: Topic, token: Option<&str>) -> Result<Subscription> {
        if !self.token_policy.authorize(token, &topic) {
            return Err(Error::Validation(format!("unauthorized subscription to {}", topic.wire_name())));
        }

        let connection_id = connection_id.into();
        let channel = self.channel(&topic);
        channel.subscribers.insert(connection_id.clone(), ());
        let receiver = channel.sender.subscribe();

        Ok(Subscription { topic: topic.wire_name(), connection_id, receiver })
    }

    pub fn unsubscribe(&self, connection_id: &str, topic: &Topic) {
        if let Some(channel) = self.channels.get(&topic.wire_name()) {
            channel.subscribers.remove(connection_id);
        }
    }

    /// Delivers `payload` to every current subscriber of `topic`, stamping
    /// it with the topic's next monotonic sequence number. Returns that
    /// sequence even when there are no subscribers yet.
    pub fn publish(&self, topic: Topic, payload: serde_json::Value) -> u64 {
        let channel = self.channel(&topic);
        let sequence = channel.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message { topic: topic.wire_name(), sequence, timestamp: Utc::now(), payload };

        match channel.sender.send(Envelope::Message(message)) {
            Ok(count) => tracing::trace!(topic = %topic.wire_name(), subscribers = count, "published"),
            Err(_) => tracing::trace!(topic = %topic.wire_name(), "published with no active subscribers"),
        }
        sequence
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.channels.get(&topic.wire_name()).map(|c| c.subscribers.len()).unwrap_or(0)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    pub topic: String,
    pub connection_id: String,
    receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Awaits the next envelope. A subscriber that fell behind the
    /// channel's capacity receives [`Envelope::Lag`] instead of its
    /// missed messages, then resumes from the current tail.
    pub async fn recv(&mut self) -> Result<Envelope> {
        match self.receiver.recv().await {
            Ok(envelope) => Ok(envelope),
            Err(broadcast::error::RecvError::Lagged(dropped)) => Ok(Envelope::Lag { dropped }),
            Err(broadcast::error::RecvError::Closed) => Err(Error::Other(anyhow::anyhow!("topic {} closed", self.topic))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_message_with_monotonic_sequence() {
        let broadcaster = Broadcaster::new();
        let mut subscription = broadcaster.subscribe("conn-1", Topic::SecurityEvents, None).unwrap();

        broadcaster.publish(Topic::SecurityEvents, serde_json::json!({"n": 1}));
        broadcaster.publish(Topic::SecurityEvents, serde_json::json!({"n": 2}));

        let first = subscription.recv().await.unwrap();
        let second = subscription.recv().await.unwrap();
        match (first, second) {
            (Envelope::Message(a), Envelope::Message(b)) => {
                assert_eq!(a.sequence, 1);
                assert_eq!(b.sequence, 2);
            }
            _ => panic!("expected two messages"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_a_lag_notice_instead_of_missed_messages() {
        let broadcaster = Broadcaster::with_capacity(2);
        let mut subscription = broadcaster.subscribe("conn-1", Topic::SystemMetrics, None).unwrap();

        for i in 0..5 {
            broadcaster.publish(Topic::SystemMetrics, serde_json::json!({"n": i}));
        }

        let envelope = subscription.recv().await.unwrap();
        assert!(matches!(envelope, Envelope::Lag { .. }));
    }

    #[tokio::test]
    async fn unsubscribe_removes_bookkeeping_but_does_not_error() {
        let broadcaster = Broadcaster::new();
        let _subscription = broadcaster.subscribe("conn-1", Topic::DashboardUpdates, None).unwrap();
        assert_eq!(broadcaster.subscriber_count(&Topic::DashboardUpdates), 1);

        broadcaster.unsubscribe("conn-1", &Topic::DashboardUpdates);
        assert_eq!(broadcaster.subscriber_count(&Topic::DashboardUpdates), 0);
    }

    struct DenyAllTokenPolicy;
    impl TokenPolicy for DenyAllTokenPolicy {
        fn authorize(&self, _token: Option<&str>, _topic: &Topic) -> bool {
            false
        }
    }

    #[test]
    fn token_policy_can_reject_a_subscription() {
        let broadcaster = Broadcaster::with_token_policy(DEFAULT_CAPACITY, Arc::new(DenyAllTokenPolicy));
        let result = broadcaster.subscribe("conn-1", Topic::SecurityEvents, Some("token"));
        assert!(result.is_err());
    }
}
