//! Integration tests for tandem
//!
//! Multi-session scenarios over the in-memory bus, exercising the graph
//! engine, the collaboration channel, and the server's session plumbing
//! together.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tandem_collab::{
    Change, CollaborationChannel, CursorFrame, MemoryBus, MemoryPresence, Presence, Transport,
};
use tandem_core::intents::NodeChange;
use tandem_core::model::{Edge, Node, Position};
use tandem_core::store::GraphStore;
use tandem_server::session::Session;
use tandem_server::websocket::ClientMessage;
use tandem_server::{EngineConfig, ServerState};

fn channel(identity: &str, bus: &Arc<MemoryBus>) -> CollaborationChannel {
    CollaborationChannel::new(
        identity,
        bus.clone() as Arc<dyn Transport>,
        None,
        Duration::from_millis(0),
    )
}

fn seeded_store() -> GraphStore {
    let mut store = GraphStore::new();
    store.add_node(Node::new("n1", 0.0, 0.0));
    store.add_node(Node::new("n2", 100.0, 0.0));
    store
}

/// A change published by one session reaches the peer exactly once and is
/// never reapplied from the publisher's own echo.
#[tokio::test]
async fn change_replays_once_and_self_echo_is_suppressed() {
    let bus = Arc::new(MemoryBus::default());
    let mut alice = channel("alice", &bus);
    let mut bob = channel("bob", &bus);
    let mut alice_store = seeded_store();
    let mut bob_store = seeded_store();

    let alice_subs = alice.join("flow", BTreeMap::new()).unwrap();
    let bob_subs = bob.join("flow", BTreeMap::new()).unwrap();
    let mut alice_rx = alice_subs.changes;
    let mut bob_rx = bob_subs.changes;

    alice
        .publish_change(
            &mut alice_store,
            Change::EdgeAdd {
                edge: Edge::new("e1", "n1", "n2"),
            },
        )
        .unwrap();
    assert_eq!(alice_store.edge_count(), 1);

    let payload = bob_rx.recv().await.unwrap();
    assert!(bob.handle_change(&mut bob_store, &payload).is_some());
    assert_eq!(bob_store.edge_count(), 1);

    // Alice's own echo comes back and must not be reapplied.
    let echo = alice_rx.recv().await.unwrap();
    assert!(alice.handle_change(&mut alice_store, &echo).is_none());
    assert_eq!(alice_store.edge_count(), 1);
}

/// Two writers touching the same node converge on whichever change each
/// session applied last, by arrival order. No merge, by design.
#[tokio::test]
async fn concurrent_writes_are_last_applier_wins() {
    let bus = Arc::new(MemoryBus::default());
    let mut alice = channel("alice", &bus);
    let mut bob = channel("bob", &bus);
    let mut alice_store = seeded_store();
    let mut bob_store = seeded_store();

    let alice_subs = alice.join("flow", BTreeMap::new()).unwrap();
    let bob_subs = bob.join("flow", BTreeMap::new()).unwrap();
    let mut alice_rx = alice_subs.changes;
    let mut bob_rx = bob_subs.changes;

    let move_to = |x: f64| Change::Nodes {
        changes: vec![NodeChange::Position {
            id: "n1".into(),
            position: Position::new(x, 0.0),
            dragging: false,
        }],
    };
    alice.publish_change(&mut alice_store, move_to(10.0)).unwrap();
    bob.publish_change(&mut bob_store, move_to(99.0)).unwrap();

    // Each session drains the topic: its own echo is suppressed, the
    // other's edit lands last.
    for _ in 0..2 {
        let payload = bob_rx.recv().await.unwrap();
        bob.handle_change(&mut bob_store, &payload);
        let payload = alice_rx.recv().await.unwrap();
        alice.handle_change(&mut alice_store, &payload);
    }

    assert_eq!(bob_store.get_node("n1").unwrap().position.x, 10.0);
    assert_eq!(alice_store.get_node("n1").unwrap().position.x, 99.0);
}

/// Bulk delete replays with the same node-then-edge order and cascade on
/// the receiving side.
#[tokio::test]
async fn bulk_delete_replays_with_cascade() {
    let bus = Arc::new(MemoryBus::default());
    let mut alice = channel("alice", &bus);
    let mut bob = channel("bob", &bus);
    let mut alice_store = seeded_store();
    let mut bob_store = seeded_store();
    for store in [&mut alice_store, &mut bob_store] {
        store.add_node(Node::new("n3", 200.0, 0.0));
        store.add_edge(Edge::new("e1", "n1", "n2"));
        store.add_edge(Edge::new("e2", "n2", "n3"));
    }

    alice.join("flow", BTreeMap::new()).unwrap();
    let bob_subs = bob.join("flow", BTreeMap::new()).unwrap();
    let mut bob_rx = bob_subs.changes;

    alice
        .publish_change(
            &mut alice_store,
            Change::BulkDelete {
                node_ids: vec!["n2".into()],
                edge_ids: vec![],
            },
        )
        .unwrap();

    let payload = bob_rx.recv().await.unwrap();
    bob.handle_change(&mut bob_store, &payload);
    assert_eq!(bob_store.node_count(), 2);
    assert_eq!(bob_store.edge_count(), 0);
}

/// A peer leaving must remove its cursor on every other session.
#[tokio::test]
async fn presence_leave_drops_the_peer_cursor() {
    let bus = Arc::new(MemoryBus::default());
    let presence: Arc<MemoryPresence> =
        Arc::new(MemoryPresence::new(bus.clone() as Arc<dyn Transport>));
    let mut alice = CollaborationChannel::new(
        "alice",
        bus.clone() as Arc<dyn Transport>,
        Some(presence.clone() as Arc<dyn Presence>),
        Duration::from_millis(0),
    );
    let mut bob = CollaborationChannel::new(
        "bob",
        bus.clone() as Arc<dyn Transport>,
        Some(presence.clone() as Arc<dyn Presence>),
        Duration::from_millis(0),
    );

    let alice_subs = alice.join("flow", BTreeMap::new()).unwrap();
    bob.join("flow", BTreeMap::new()).unwrap();
    let mut alice_presence = alice_subs.presence.unwrap();

    // Bob's join diff arrives first.
    let join_diff = alice_presence.recv().await.unwrap();
    let (diff, _) = alice.handle_presence(&join_diff).unwrap();
    assert_eq!(diff.joins[0].identity, "bob");

    let frame = serde_json::to_string(&CursorFrame {
        origin: "bob".into(),
        x: 5.0,
        y: 5.0,
    })
    .unwrap();
    alice.handle_cursor(&frame);
    assert!(alice.peer_cursors().contains_key("bob"));

    bob.leave();
    let leave_diff = alice_presence.recv().await.unwrap();
    let (diff, removed) = alice.handle_presence(&leave_diff).unwrap();
    assert_eq!(diff.leaves[0].identity, "bob");
    assert_eq!(removed, vec!["bob".to_string()]);
    assert!(!alice.peer_cursors().contains_key("bob"));
}

/// A session joining an already-edited flow starts from the seed state.
#[tokio::test]
async fn late_joiners_are_seeded_with_current_flow_state() {
    let state = Arc::new(ServerState::new(EngineConfig::default()));

    let mut first = Session::new(
        "first",
        &state.engine,
        state.bus.clone() as Arc<dyn Transport>,
        Some(state.presence.clone() as Arc<dyn Presence>),
    );
    let empty = GraphStore::new();
    first.join("flow", "amy", &empty).unwrap();

    // First session builds some state; mirror the published changes onto
    // the seed the way the WebSocket loop does.
    let seed = state.flow("flow");
    {
        let mut seed = seed.write().await;
        seed.add_node(Node::new("n1", 0.0, 0.0));
        seed.add_node(Node::new("n2", 50.0, 50.0));
        seed.add_edge(Edge::new("e1", "n1", "n2"));
    }

    let mut second = Session::new(
        "second",
        &state.engine,
        state.bus.clone() as Arc<dyn Transport>,
        Some(state.presence.clone() as Arc<dyn Presence>),
    );
    let seed_snapshot = seed.read().await.clone();
    second.join("flow", "ben", &seed_snapshot).unwrap();
    assert_eq!(second.store().node_count(), 2);
    assert_eq!(second.store().edge_count(), 1);
    assert!(second.store().selected_nodes().is_empty());
}

/// The whole client path: connect attempt through a session propagates to
/// a peer channel, and an invalid one is rejected without a broadcast.
#[tokio::test]
async fn session_connect_propagates_and_rejects() {
    let state = Arc::new(ServerState::new(EngineConfig::default()));
    let mut session = Session::new(
        "amy",
        &state.engine,
        state.bus.clone() as Arc<dyn Transport>,
        Some(state.presence.clone() as Arc<dyn Presence>),
    );
    let seed = seeded_store();
    session.join("flow", "amy", &seed).unwrap();

    let mut peer = channel("peer", &state.bus);
    let peer_subs = peer.join("flow", BTreeMap::new()).unwrap();
    let mut peer_rx = peer_subs.changes;
    let mut peer_store = seeded_store();

    let outcome = session.handle_client(ClientMessage::Connect {
        connection: tandem_core::model::Connection::new("n1", "n2"),
    });
    assert_eq!(outcome.published.len(), 1);
    let payload = peer_rx.recv().await.unwrap();
    assert!(peer.handle_change(&mut peer_store, &payload).is_some());
    assert_eq!(peer_store.edge_count(), 1);

    // Same connection again: duplicate, rejected, nothing broadcast.
    let outcome = session.handle_client(ClientMessage::Connect {
        connection: tandem_core::model::Connection::new("n1", "n2"),
    });
    assert!(outcome.published.is_empty());
}
