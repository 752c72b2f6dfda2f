//! Per-session collaboration channel
//!
//! State machine: unjoined → joined(flow, identity) → unjoined. A local
//! mutation is applied to the session's own store first (optimistic, zero
//! added latency), then broadcast; receivers drop envelopes carrying their
//! own identity, since a receiver cannot otherwise tell its already-applied
//! change from a genuine remote one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tandem_core::store::GraphStore;

use crate::message::{
    apply_change, change_topic, cursor_topic, presence_topic, Change, ChangeEnvelope, CursorFrame,
    PresenceDiff,
};
use crate::presence::Presence;
use crate::transport::Transport;

/// Channel lifecycle errors. Everything else on this path is absorbed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not joined to a flow")]
    NotJoined,
    #[error("channel is already joined to flow {0}")]
    AlreadyJoined(String),
}

/// Receivers handed to the hosting runtime on join. The runtime funnels
/// them through its one ordered per-session queue.
#[derive(Debug)]
pub struct Subscriptions {
    pub changes: broadcast::Receiver<String>,
    pub cursors: broadcast::Receiver<String>,
    pub presence: Option<broadcast::Receiver<String>>,
}

/// Latest reported cursor coordinate for one peer. Receivers wanting smooth
/// rendering interpolate toward it; that is a rendering concern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerCursor {
    pub x: f64,
    pub y: f64,
}

enum ChannelState {
    Unjoined,
    Joined { flow_id: String },
}

/// One session's connection to a flow's topics.
pub struct CollaborationChannel {
    identity: String,
    transport: Arc<dyn Transport>,
    presence: Option<Arc<dyn Presence>>,
    state: ChannelState,
    /// Sender-side cursor throttle, held here rather than in any ambient
    /// global state.
    cursor_min_interval: Duration,
    last_cursor_emit: Option<Instant>,
    peer_cursors: BTreeMap<String, PeerCursor>,
}

impl CollaborationChannel {
    pub fn new(
        identity: impl Into<String>,
        transport: Arc<dyn Transport>,
        presence: Option<Arc<dyn Presence>>,
        cursor_min_interval: Duration,
    ) -> Self {
        CollaborationChannel {
            identity: identity.into(),
            transport,
            presence,
            state: ChannelState::Unjoined,
            cursor_min_interval,
            last_cursor_emit: None,
            peer_cursors: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.state, ChannelState::Joined { .. })
    }

    pub fn flow_id(&self) -> Option<&str> {
        match &self.state {
            ChannelState::Joined { flow_id } => Some(flow_id),
            ChannelState::Unjoined => None,
        }
    }

    /// Subscribe to the flow's change and cursor topics, plus presence when
    /// that capability was supplied, and register this identity there.
    pub fn join(
        &mut self,
        flow_id: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Subscriptions, ChannelError> {
        if let ChannelState::Joined { flow_id } = &self.state {
            return Err(ChannelError::AlreadyJoined(flow_id.clone()));
        }
        let changes = self.transport.subscribe(&change_topic(flow_id));
        let cursors = self.transport.subscribe(&cursor_topic(flow_id));
        // Register before subscribing so a session never sees its own join
        // diff; peers subscribed earlier still do.
        let presence_rx = self.presence.as_ref().map(|presence| {
            presence.track(&presence_topic(flow_id), &self.identity, metadata);
            self.transport.subscribe(&presence_topic(flow_id))
        });
        info!("Session {} joined flow {}", self.identity, flow_id);
        self.state = ChannelState::Joined {
            flow_id: flow_id.to_string(),
        };
        Ok(Subscriptions {
            changes,
            cursors,
            presence: presence_rx,
        })
    }

    /// Leave the current flow. Idempotent; leaving while unjoined is a
    /// no-op.
    pub fn leave(&mut self) {
        let ChannelState::Joined { flow_id } = &self.state else {
            debug!("Leave on unjoined channel ignored");
            return;
        };
        let flow_id = flow_id.clone();
        if let Some(presence) = &self.presence {
            presence.untrack(&presence_topic(&flow_id), &self.identity);
        }
        self.transport.unsubscribe(&change_topic(&flow_id));
        self.transport.unsubscribe(&cursor_topic(&flow_id));
        self.transport.unsubscribe(&presence_topic(&flow_id));
        info!("Session {} left flow {}", self.identity, flow_id);
        self.state = ChannelState::Unjoined;
        self.last_cursor_emit = None;
        self.peer_cursors.clear();
    }

    /// Apply a local change to the session's own store, then broadcast it
    /// to peers under this session's identity.
    pub fn publish_change(
        &mut self,
        store: &mut GraphStore,
        change: Change,
    ) -> Result<(), ChannelError> {
        let ChannelState::Joined { flow_id } = &self.state else {
            return Err(ChannelError::NotJoined);
        };
        apply_change(store, &change);
        let envelope = ChangeEnvelope {
            origin: self.identity.clone(),
            change,
        };
        match serde_json::to_string(&envelope) {
            Ok(payload) => {
                self.transport.broadcast(&change_topic(flow_id), payload);
            }
            Err(e) => warn!("Failed to serialize change envelope: {}", e),
        }
        Ok(())
    }

    /// Handle one inbound change payload. Returns the applied envelope when
    /// it came from a peer; self-echoes and malformed payloads return
    /// `None` and leave the store untouched.
    pub fn handle_change(
        &mut self,
        store: &mut GraphStore,
        payload: &str,
    ) -> Option<ChangeEnvelope> {
        let envelope: ChangeEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed change payload: {}", e);
                return None;
            }
        };
        if envelope.origin == self.identity {
            debug!("Suppressed self-echo from {}", envelope.origin);
            return None;
        }
        apply_change(store, &envelope.change);
        Some(envelope)
    }

    /// Broadcast this session's cursor position, rate-limited to one frame
    /// per configured interval. Returns false when the frame was dropped by
    /// the throttle.
    pub fn publish_cursor(&mut self, x: f64, y: f64) -> Result<bool, ChannelError> {
        let ChannelState::Joined { flow_id } = &self.state else {
            return Err(ChannelError::NotJoined);
        };
        let now = Instant::now();
        if let Some(last) = self.last_cursor_emit {
            if now.duration_since(last) < self.cursor_min_interval {
                return Ok(false);
            }
        }
        self.last_cursor_emit = Some(now);
        let frame = CursorFrame {
            origin: self.identity.clone(),
            x,
            y,
        };
        match serde_json::to_string(&frame) {
            Ok(payload) => {
                self.transport.broadcast(&cursor_topic(flow_id), payload);
            }
            Err(e) => warn!("Failed to serialize cursor frame: {}", e),
        }
        Ok(true)
    }

    /// Handle one inbound cursor payload, keeping the latest coordinate per
    /// peer. Returns the frame when it came from a peer.
    pub fn handle_cursor(&mut self, payload: &str) -> Option<CursorFrame> {
        let frame: CursorFrame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring malformed cursor payload: {}", e);
                return None;
            }
        };
        if frame.origin == self.identity {
            return None;
        }
        self.peer_cursors.insert(
            frame.origin.clone(),
            PeerCursor {
                x: frame.x,
                y: frame.y,
            },
        );
        Some(frame)
    }

    /// Handle one inbound presence payload. Every leave synthesizes a
    /// cursor removal so stale cursors are not left rendered; the removed
    /// identities are returned along with the diff.
    pub fn handle_presence(&mut self, payload: &str) -> Option<(PresenceDiff, Vec<String>)> {
        let diff: PresenceDiff = match serde_json::from_str(payload) {
            Ok(diff) => diff,
            Err(e) => {
                warn!("Ignoring malformed presence payload: {}", e);
                return None;
            }
        };
        let mut removed_cursors = Vec::new();
        for peer in &diff.leaves {
            self.peer_cursors.remove(&peer.identity);
            removed_cursors.push(peer.identity.clone());
        }
        Some((diff, removed_cursors))
    }

    /// Latest known peer cursor positions.
    pub fn peer_cursors(&self) -> &BTreeMap<String, PeerCursor> {
        &self.peer_cursors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBus;
    use tandem_core::model::Node;

    fn channel(identity: &str, bus: &Arc<MemoryBus>) -> CollaborationChannel {
        CollaborationChannel::new(
            identity,
            bus.clone() as Arc<dyn Transport>,
            None,
            Duration::from_millis(0),
        )
    }

    #[tokio::test]
    async fn publish_applies_locally_before_broadcast() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        let mut store = GraphStore::new();
        store.add_node(Node::new("n1", 0.0, 0.0));
        store.add_node(Node::new("n2", 0.0, 0.0));
        alice.join("f", BTreeMap::new()).unwrap();

        alice
            .publish_change(
                &mut store,
                Change::EdgeAdd {
                    edge: tandem_core::model::Edge::new("e1", "n1", "n2"),
                },
            )
            .unwrap();
        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn self_echo_is_suppressed() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        let mut store = GraphStore::new();
        let subs = alice.join("f", BTreeMap::new()).unwrap();
        let mut rx = subs.changes;

        alice
            .publish_change(
                &mut store,
                Change::Nodes {
                    changes: vec![],
                },
            )
            .unwrap();
        let echoed = rx.recv().await.unwrap();
        assert!(alice.handle_change(&mut store, &echoed).is_none());
    }

    #[tokio::test]
    async fn remote_change_is_applied_exactly_once_per_delivery() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        let mut bob = channel("bob", &bus);
        let mut alice_store = GraphStore::new();
        let mut bob_store = GraphStore::new();

        let _alice_subs = alice.join("f", BTreeMap::new()).unwrap();
        let bob_subs = bob.join("f", BTreeMap::new()).unwrap();
        let mut bob_rx = bob_subs.changes;

        alice
            .publish_change(
                &mut alice_store,
                Change::Nodes {
                    changes: vec![],
                },
            )
            .unwrap();
        let payload = bob_rx.recv().await.unwrap();
        assert!(bob.handle_change(&mut bob_store, &payload).is_some());
    }

    #[tokio::test]
    async fn publish_requires_join() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        let mut store = GraphStore::new();
        assert_eq!(
            alice.publish_change(&mut store, Change::Unknown),
            Err(ChannelError::NotJoined)
        );
        assert_eq!(alice.publish_cursor(0.0, 0.0), Err(ChannelError::NotJoined));
    }

    #[tokio::test]
    async fn double_join_is_rejected_and_leave_is_idempotent() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        alice.join("f", BTreeMap::new()).unwrap();
        assert_eq!(
            alice.join("g", BTreeMap::new()).unwrap_err(),
            ChannelError::AlreadyJoined("f".into())
        );
        alice.leave();
        alice.leave();
        assert!(!alice.is_joined());
    }

    #[tokio::test]
    async fn cursor_throttle_drops_frames_inside_interval() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = CollaborationChannel::new(
            "alice",
            bus.clone() as Arc<dyn Transport>,
            None,
            Duration::from_secs(3600),
        );
        alice.join("f", BTreeMap::new()).unwrap();
        assert!(alice.publish_cursor(1.0, 1.0).unwrap());
        assert!(!alice.publish_cursor(2.0, 2.0).unwrap());
    }

    #[tokio::test]
    async fn peer_cursors_track_latest_coordinate() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        alice.join("f", BTreeMap::new()).unwrap();

        let frame = serde_json::to_string(&CursorFrame {
            origin: "bob".into(),
            x: 1.0,
            y: 2.0,
        })
        .unwrap();
        alice.handle_cursor(&frame);
        let frame = serde_json::to_string(&CursorFrame {
            origin: "bob".into(),
            x: 9.0,
            y: 9.0,
        })
        .unwrap();
        alice.handle_cursor(&frame);
        assert_eq!(alice.peer_cursors()["bob"], PeerCursor { x: 9.0, y: 9.0 });

        // Own frames echoed back are ignored.
        let own = serde_json::to_string(&CursorFrame {
            origin: "alice".into(),
            x: 0.0,
            y: 0.0,
        })
        .unwrap();
        assert!(alice.handle_cursor(&own).is_none());
    }

    #[tokio::test]
    async fn presence_leave_synthesizes_cursor_removal() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        alice.join("f", BTreeMap::new()).unwrap();
        let frame = serde_json::to_string(&CursorFrame {
            origin: "bob".into(),
            x: 1.0,
            y: 1.0,
        })
        .unwrap();
        alice.handle_cursor(&frame);

        let diff = serde_json::to_string(&PresenceDiff {
            joins: vec![],
            leaves: vec![crate::message::PeerInfo {
                identity: "bob".into(),
                metadata: BTreeMap::new(),
            }],
        })
        .unwrap();
        let (_, removed) = alice.handle_presence(&diff).unwrap();
        assert_eq!(removed, vec!["bob".to_string()]);
        assert!(alice.peer_cursors().get("bob").is_none());
    }

    #[tokio::test]
    async fn malformed_payloads_leave_state_unchanged() {
        let bus = Arc::new(MemoryBus::default());
        let mut alice = channel("alice", &bus);
        let mut store = GraphStore::new();
        store.add_node(Node::new("n1", 0.0, 0.0));
        alice.join("f", BTreeMap::new()).unwrap();
        assert!(alice.handle_change(&mut store, "{not json").is_none());
        assert!(alice.handle_cursor("{not json").is_none());
        assert!(alice.handle_presence("{not json").is_none());
        assert_eq!(store.node_count(), 1);
    }
}
