//! WebSocket handling: one ordered event loop per client session

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tandem_collab::{apply_change, presence_topic, Change, PeerInfo, Transport};
use tandem_core::intents::{EdgeChange, NodeChange};
use tandem_core::model::{Connection, Edge, Node, Rect, Viewport};
use tandem_core::store::ViewportPatch;

use crate::session::Session;
use crate::ServerState;

/// Messages a client sends to its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    NodeChanges { changes: Vec<NodeChange> },
    EdgeChanges { changes: Vec<EdgeChange> },
    Connect { connection: Connection },
    SelectionChange {
        #[serde(default)]
        node_ids: Vec<String>,
        #[serde(default)]
        edge_ids: Vec<String>,
    },
    DeleteSelected,
    Viewport { patch: ViewportPatch },
    PushHistory,
    Undo,
    Redo,
    Copy,
    Cut,
    Paste,
    Cursor { x: f64, y: f64 },
}

/// Messages a session sends back to its client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state delivered once on join.
    Snapshot {
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        viewport: Viewport,
    },
    /// Refreshed read model after a mutation.
    StateSync {
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        viewport: Viewport,
        bounds: Option<Rect>,
    },
    /// A connection attempt was validated and refused. Data, not a close.
    Rejected { reason: String },
    /// Undo/redo/paste had nothing to do. A normal outcome.
    Empty { op: String },
    PeerChange { origin: String, change: Change },
    PeerCursor { origin: String, x: f64, y: f64 },
    /// A peer left; drop its cursor.
    CursorGone { origin: String },
    Presence {
        joins: Vec<PeerInfo>,
        leaves: Vec<PeerInfo>,
    },
    Error { message: String },
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub flow: String,
    #[serde(default)]
    pub name: String,
}

/// Handle WebSocket upgrade requests.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// One connected client. Client intents, peer changes, peer cursors, and
/// presence diffs all funnel through the single select loop below, so this
/// session's store is never mutated by two logically-concurrent calls.
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>, query: WsQuery) {
    let identity = tandem_core::fresh_id();
    info!("Session {} connecting to flow {}", identity, query.flow);

    let mut session = Session::new(
        &identity,
        &state.engine,
        state.bus.clone() as Arc<dyn Transport>,
        Some(state.presence.clone()),
    );

    let seed = state.flow(&query.flow);
    let seed_snapshot = seed.read().await.clone();
    let subscriptions = match session.join(&query.flow, &query.name, &seed_snapshot) {
        Ok(subscriptions) => subscriptions,
        Err(e) => {
            warn!("Session {} failed to join: {}", identity, e);
            return;
        }
    };
    let mut changes = subscriptions.changes;
    let mut cursors = subscriptions.cursors;
    let mut presence = subscriptions
        .presence
        .unwrap_or_else(|| state.bus.subscribe(&presence_topic(&query.flow)));

    let (mut sender, mut receiver) = socket.split();
    if !send_message(&mut sender, &session.snapshot_message()).await {
        session.leave();
        return;
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Client message from {}: {}", identity, text);
                        let message: ClientMessage = match serde_json::from_str(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Malformed client message: {}", e);
                                let reply = ServerMessage::Error { message: e.to_string() };
                                if !send_message(&mut sender, &reply).await {
                                    break;
                                }
                                continue;
                            }
                        };
                        let outcome = session.handle_client(message);
                        if !outcome.published.is_empty() {
                            let mut seed = seed.write().await;
                            for change in &outcome.published {
                                apply_change(&mut seed, change);
                            }
                        }
                        if !send_all(&mut sender, &outcome.replies).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Session {} disconnected", identity);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", identity, e);
                        break;
                    }
                }
            }
            inbound = changes.recv() => {
                match relay(inbound, &identity) {
                    Relay::Payload(payload) => {
                        let replies = session.handle_peer_change(&payload);
                        if !send_all(&mut sender, &replies).await {
                            break;
                        }
                    }
                    Relay::Skip => continue,
                    Relay::Closed => break,
                }
            }
            inbound = cursors.recv() => {
                match relay(inbound, &identity) {
                    Relay::Payload(payload) => {
                        if let Some(reply) = session.handle_peer_cursor(&payload) {
                            if !send_message(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Relay::Skip => continue,
                    Relay::Closed => break,
                }
            }
            inbound = presence.recv() => {
                match relay(inbound, &identity) {
                    Relay::Payload(payload) => {
                        let replies = session.handle_presence(&payload);
                        if !send_all(&mut sender, &replies).await {
                            break;
                        }
                    }
                    Relay::Skip => continue,
                    Relay::Closed => break,
                }
            }
        }
    }

    session.leave();
    info!("Session {} closed", identity);
}

enum Relay {
    Payload(String),
    Skip,
    Closed,
}

/// Classify one broadcast receive. Lag means this subscriber missed
/// messages, which the at-least-once, no-global-order model already
/// admits; it is logged and skipped rather than treated as fatal.
fn relay(result: Result<String, broadcast::error::RecvError>, identity: &str) -> Relay {
    match result {
        Ok(payload) => Relay::Payload(payload),
        Err(broadcast::error::RecvError::Lagged(missed)) => {
            warn!("Session {} lagged, missed {} messages", identity, missed);
            Relay::Skip
        }
        Err(broadcast::error::RecvError::Closed) => Relay::Closed,
    }
}

async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize server message: {}", e);
            true
        }
    }
}

async fn send_all(sender: &mut SplitSink<WebSocket, Message>, messages: &[ServerMessage]) -> bool {
    for message in messages {
        if !send_message(sender, message).await {
            return false;
        }
    }
    true
}
