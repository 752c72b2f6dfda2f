//! Presence capability: who is in a flow right now

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::message::{PeerInfo, PresenceDiff};
use crate::transport::Transport;

/// Optional injected capability reporting which identities are currently
/// registered on a topic, with join/leave diffs broadcast as they happen.
pub trait Presence: Send + Sync {
    fn track(&self, topic: &str, identity: &str, metadata: BTreeMap<String, String>);
    fn untrack(&self, topic: &str, identity: &str);
    fn list(&self, topic: &str) -> BTreeMap<String, BTreeMap<String, String>>;
}

/// In-process presence registry publishing diffs through a [`Transport`].
pub struct MemoryPresence {
    rooms: DashMap<String, BTreeMap<String, BTreeMap<String, String>>>,
    transport: Arc<dyn Transport>,
}

impl MemoryPresence {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        MemoryPresence {
            rooms: DashMap::new(),
            transport,
        }
    }

    fn publish(&self, topic: &str, diff: PresenceDiff) {
        match serde_json::to_string(&diff) {
            Ok(payload) => {
                self.transport.broadcast(topic, payload);
            }
            Err(e) => tracing::warn!("Failed to serialize presence diff: {}", e),
        }
    }
}

impl Presence for MemoryPresence {
    fn track(&self, topic: &str, identity: &str, mut metadata: BTreeMap<String, String>) {
        metadata
            .entry("joined_at".to_string())
            .or_insert_with(|| chrono::Utc::now().to_rfc3339());
        self.rooms
            .entry(topic.to_string())
            .or_default()
            .insert(identity.to_string(), metadata.clone());
        tracing::info!("Presence join: {} on {}", identity, topic);
        self.publish(
            topic,
            PresenceDiff {
                joins: vec![PeerInfo {
                    identity: identity.to_string(),
                    metadata,
                }],
                leaves: vec![],
            },
        );
    }

    fn untrack(&self, topic: &str, identity: &str) {
        let removed = self
            .rooms
            .get_mut(topic)
            .and_then(|mut room| room.remove(identity));
        let Some(metadata) = removed else {
            return;
        };
        tracing::info!("Presence leave: {} on {}", identity, topic);
        self.publish(
            topic,
            PresenceDiff {
                joins: vec![],
                leaves: vec![PeerInfo {
                    identity: identity.to_string(),
                    metadata,
                }],
            },
        );
    }

    fn list(&self, topic: &str) -> BTreeMap<String, BTreeMap<String, String>> {
        self.rooms
            .get(topic)
            .map(|room| room.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBus;

    #[tokio::test]
    async fn track_and_untrack_publish_diffs() {
        let bus: Arc<MemoryBus> = Arc::new(MemoryBus::default());
        let presence = MemoryPresence::new(bus.clone());
        let mut rx = bus.subscribe("flow:f:presence");

        presence.track("flow:f:presence", "alice", BTreeMap::new());
        let diff: PresenceDiff = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(diff.joins[0].identity, "alice");
        assert!(diff.joins[0].metadata.contains_key("joined_at"));

        assert_eq!(presence.list("flow:f:presence").len(), 1);

        presence.untrack("flow:f:presence", "alice");
        let diff: PresenceDiff = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(diff.leaves[0].identity, "alice");
        assert!(presence.list("flow:f:presence").is_empty());
    }

    #[test]
    fn untrack_of_unknown_identity_is_silent() {
        let bus: Arc<MemoryBus> = Arc::new(MemoryBus::default());
        let presence = MemoryPresence::new(bus);
        presence.untrack("flow:f:presence", "ghost");
        assert!(presence.list("flow:f:presence").is_empty());
    }
}
