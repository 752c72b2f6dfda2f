//! One client session: local state plus its collaboration channel
//!
//! The WebSocket loop owns exactly one `Session` and funnels every inbound
//! event through it in order, which is the serialization guarantee the core
//! assumes. History and clipboard live here and are never broadcast.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tandem_collab::{
    Change, ChannelError, CollaborationChannel, Presence, Subscriptions, Transport,
};
use tandem_core::clipboard::Clipboard;
use tandem_core::history::HistoryStack;
use tandem_core::intents::{apply_selection_change, EdgeChange, SelectionChange};
use tandem_core::store::GraphStore;
use tandem_core::validate::{default_rules, validate, ConnectionRule};

use crate::websocket::{ClientMessage, ServerMessage};
use crate::EngineConfig;

/// What handling one client message produced: replies for this client, and
/// the changes that were broadcast (the caller mirrors those onto the
/// flow's seed store).
#[derive(Debug, Default)]
pub struct ClientOutcome {
    pub replies: Vec<ServerMessage>,
    pub published: Vec<Change>,
}

pub struct Session {
    store: GraphStore,
    history: HistoryStack,
    clipboard: Clipboard,
    channel: CollaborationChannel,
    rules: Vec<ConnectionRule>,
    paste_offset: f64,
}

impl Session {
    pub fn new(
        identity: impl Into<String>,
        engine: &EngineConfig,
        transport: Arc<dyn Transport>,
        presence: Option<Arc<dyn Presence>>,
    ) -> Self {
        Session {
            store: GraphStore::new(),
            history: HistoryStack::new(engine.history_limit),
            clipboard: Clipboard::new(),
            channel: CollaborationChannel::new(
                identity,
                transport,
                presence,
                Duration::from_millis(engine.cursor_min_interval_ms),
            ),
            rules: default_rules(),
            paste_offset: engine.paste_offset,
        }
    }

    pub fn identity(&self) -> &str {
        self.channel.identity()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Join a flow and seed the local store from the flow's current state.
    pub fn join(
        &mut self,
        flow_id: &str,
        display_name: &str,
        seed: &GraphStore,
    ) -> Result<Subscriptions, ChannelError> {
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), display_name.to_string());
        let subscriptions = self.channel.join(flow_id, metadata)?;
        self.store
            .replace_all(seed.nodes_list(), seed.edges_list());
        self.store.clear_selection();
        Ok(subscriptions)
    }

    pub fn leave(&mut self) {
        self.channel.leave();
    }

    /// The full-state message sent right after joining.
    pub fn snapshot_message(&self) -> ServerMessage {
        ServerMessage::Snapshot {
            nodes: self.store.nodes_list(),
            edges: self.store.edges_list(),
            viewport: self.store.viewport(),
        }
    }

    fn state_sync(&self) -> ServerMessage {
        ServerMessage::StateSync {
            nodes: self.store.nodes_list(),
            edges: self.store.edges_list(),
            viewport: self.store.viewport(),
            bounds: self.store.bounds(),
        }
    }

    /// Handle one message from this session's own client.
    pub fn handle_client(&mut self, message: ClientMessage) -> ClientOutcome {
        let mut outcome = ClientOutcome::default();
        match message {
            ClientMessage::NodeChanges { changes } => {
                self.publish(&mut outcome, Change::Nodes { changes });
                outcome.replies.push(self.state_sync());
            }
            ClientMessage::EdgeChanges { changes } => {
                for change in &changes {
                    let EdgeChange::Remove { id } = change;
                    self.publish(&mut outcome, Change::EdgeRemove { id: id.clone() });
                }
                outcome.replies.push(self.state_sync());
            }
            ClientMessage::Connect { connection } => {
                match validate(&self.store, &connection, &self.rules) {
                    Ok(()) => {
                        let edge = connection.into_edge();
                        self.publish(&mut outcome, Change::EdgeAdd { edge });
                        outcome.replies.push(self.state_sync());
                    }
                    Err(reason) => {
                        outcome.replies.push(ServerMessage::Rejected {
                            reason: reason.to_string(),
                        });
                    }
                }
            }
            ClientMessage::SelectionChange { node_ids, edge_ids } => {
                apply_selection_change(
                    &mut self.store,
                    &SelectionChange { node_ids, edge_ids },
                );
                outcome.replies.push(self.state_sync());
            }
            ClientMessage::DeleteSelected => {
                let node_ids: Vec<String> = self.store.selected_nodes().iter().cloned().collect();
                let edge_ids: Vec<String> = self.store.selected_edges().iter().cloned().collect();
                if node_ids.is_empty() && edge_ids.is_empty() {
                    outcome.replies.push(ServerMessage::Empty {
                        op: "delete_selected".to_string(),
                    });
                } else {
                    self.publish(&mut outcome, Change::BulkDelete { node_ids, edge_ids });
                    outcome.replies.push(self.state_sync());
                }
            }
            ClientMessage::Viewport { patch } => {
                self.store.update_viewport(patch);
                outcome.replies.push(self.state_sync());
            }
            ClientMessage::PushHistory => {
                // The client decides gesture boundaries; we only stack.
                self.history.push(&self.store);
            }
            ClientMessage::Undo => match self.history.undo(&self.store) {
                Some(restored) => {
                    self.store = restored;
                    outcome.replies.push(self.state_sync());
                }
                None => outcome.replies.push(ServerMessage::Empty {
                    op: "undo".to_string(),
                }),
            },
            ClientMessage::Redo => match self.history.redo(&self.store) {
                Some(restored) => {
                    self.store = restored;
                    outcome.replies.push(self.state_sync());
                }
                None => outcome.replies.push(ServerMessage::Empty {
                    op: "redo".to_string(),
                }),
            },
            ClientMessage::Copy => {
                self.clipboard.copy(&self.store);
            }
            ClientMessage::Cut => {
                self.clipboard.copy(&self.store);
                let node_ids: Vec<String> = self.store.selected_nodes().iter().cloned().collect();
                let edge_ids: Vec<String> = self.store.selected_edges().iter().cloned().collect();
                if !node_ids.is_empty() || !edge_ids.is_empty() {
                    self.publish(&mut outcome, Change::BulkDelete { node_ids, edge_ids });
                }
                outcome.replies.push(self.state_sync());
            }
            ClientMessage::Paste => match self.clipboard.paste(&mut self.store, self.paste_offset)
            {
                Some(_) => outcome.replies.push(self.state_sync()),
                None => outcome.replies.push(ServerMessage::Empty {
                    op: "paste".to_string(),
                }),
            },
            ClientMessage::Cursor { x, y } => {
                // Throttle drops are silent; the next frame catches up.
                let _ = self.channel.publish_cursor(x, y);
            }
        }
        outcome
    }

    fn publish(&mut self, outcome: &mut ClientOutcome, change: Change) {
        match self.channel.publish_change(&mut self.store, change.clone()) {
            Ok(()) => outcome.published.push(change),
            Err(e) => {
                tracing::warn!("Dropping change from unjoined session: {}", e);
                outcome.replies.push(ServerMessage::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Handle one payload from the flow's change topic.
    pub fn handle_peer_change(&mut self, payload: &str) -> Vec<ServerMessage> {
        match self.channel.handle_change(&mut self.store, payload) {
            Some(envelope) => vec![
                ServerMessage::PeerChange {
                    origin: envelope.origin,
                    change: envelope.change,
                },
                self.state_sync(),
            ],
            None => Vec::new(),
        }
    }

    /// Handle one payload from the flow's cursor topic.
    pub fn handle_peer_cursor(&mut self, payload: &str) -> Option<ServerMessage> {
        self.channel
            .handle_cursor(payload)
            .map(|frame| ServerMessage::PeerCursor {
                origin: frame.origin,
                x: frame.x,
                y: frame.y,
            })
    }

    /// Handle one payload from the flow's presence topic. Leaves synthesize
    /// cursor removals so no stale cursor stays rendered.
    pub fn handle_presence(&mut self, payload: &str) -> Vec<ServerMessage> {
        let Some((diff, removed)) = self.channel.handle_presence(payload) else {
            return Vec::new();
        };
        let mut messages = vec![ServerMessage::Presence {
            joins: diff.joins,
            leaves: diff.leaves,
        }];
        for origin in removed {
            messages.push(ServerMessage::CursorGone { origin });
        }
        messages
    }
}
