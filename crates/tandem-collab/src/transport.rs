//! Pub/sub transport capability

use dashmap::DashMap;
use tokio::sync::broadcast;

/// The injected pub/sub capability sessions coordinate through.
///
/// Guarantees assumed by the protocol: messages from one publisher on one
/// topic reach a subscriber in publish order; nothing is guaranteed across
/// publishers or topics. Broadcasts are fire-and-forget.
pub trait Transport: Send + Sync {
    /// Subscribe to a topic. Dropping the receiver ends the subscription.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String>;

    /// Drop a topic's plumbing once nothing is listening anymore.
    fn unsubscribe(&self, topic: &str);

    /// Publish to every current subscriber. Returns how many were reached;
    /// zero is not an error.
    fn broadcast(&self, topic: &str, payload: String) -> usize;
}

/// In-process transport over tokio broadcast channels, one per topic.
pub struct MemoryBus {
    topics: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        MemoryBus {
            topics: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        // Deep enough that only a badly stalled subscriber ever lags.
        Self::new(256)
    }
}

impl Transport for MemoryBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.sender(topic).subscribe()
    }

    fn unsubscribe(&self, topic: &str) {
        let drained = self
            .topics
            .get(topic)
            .map(|tx| tx.receiver_count() == 0)
            .unwrap_or(false);
        if drained {
            self.topics.remove(topic);
            tracing::debug!("Dropped drained topic: {}", topic);
        }
    }

    fn broadcast(&self, topic: &str, payload: String) -> usize {
        // send only errors when no receiver exists, which is fine here.
        self.sender(topic).send(payload).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_publish_order_per_topic() {
        let bus = MemoryBus::default();
        let mut rx = bus.subscribe("t");
        bus.broadcast("t", "one".into());
        bus.broadcast("t", "two".into());
        assert_eq!(rx.recv().await.unwrap(), "one");
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_not_an_error() {
        let bus = MemoryBus::default();
        assert_eq!(bus.broadcast("empty", "lost".into()), 0);
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus = MemoryBus::default();
        let mut a = bus.subscribe("a");
        let _b = bus.subscribe("b");
        bus.broadcast("b", "only-b".into());
        bus.broadcast("a", "only-a".into());
        assert_eq!(a.recv().await.unwrap(), "only-a");
    }

    #[tokio::test]
    async fn unsubscribe_drops_drained_topics() {
        let bus = MemoryBus::default();
        let rx = bus.subscribe("t");
        drop(rx);
        bus.unsubscribe("t");
        assert!(bus.topics.get("t").is_none());
    }
}
