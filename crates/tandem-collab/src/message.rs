//! Wire messages for the collaboration protocol
//!
//! Everything on the bus is a JSON string. Change envelopes carry the
//! sender's identity so receivers can drop their own echoes; unknown change
//! kinds decode to `Unknown` and are ignored on replay, which keeps
//! differently-versioned peers compatible.

use serde::{Deserialize, Serialize};

use tandem_core::intents::{apply_node_changes, NodeChange};
use tandem_core::model::{Edge, Node};
use tandem_core::store::GraphStore;

/// One logical mutation, as broadcast between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Batched node changes, applied by id; missing ids are skipped.
    Nodes { changes: Vec<NodeChange> },
    /// Idempotent insert by id.
    EdgeAdd { edge: Edge },
    /// Idempotent removal; missing ids are ignored.
    EdgeRemove { id: String },
    /// Remove the listed node ids, then the listed edge ids.
    BulkDelete {
        node_ids: Vec<String>,
        edge_ids: Vec<String>,
    },
    /// Unconditional full-state overwrite, used for resets.
    Replace { nodes: Vec<Node>, edges: Vec<Edge> },
    /// Anything a newer peer may send that this version does not know.
    #[serde(other)]
    Unknown,
}

/// A change plus the identity that published it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    pub origin: String,
    pub change: Change,
}

/// One cursor position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorFrame {
    pub origin: String,
    pub x: f64,
    pub y: f64,
}

/// One peer as reported by presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub identity: String,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
}

/// A presence diff: who arrived, who left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: Vec<PeerInfo>,
    #[serde(default)]
    pub leaves: Vec<PeerInfo>,
}

/// Topic carrying change envelopes for one flow.
pub fn change_topic(flow_id: &str) -> String {
    format!("flow:{flow_id}")
}

/// Topic carrying cursor frames. Separate from changes so its broadcast
/// cadence can be throttled independently.
pub fn cursor_topic(flow_id: &str) -> String {
    format!("flow:{flow_id}:cursor")
}

/// Topic carrying presence diffs.
pub fn presence_topic(flow_id: &str) -> String {
    format!("flow:{flow_id}:presence")
}

/// Replay a change onto a store. Every arm is idempotent against late or
/// duplicate delivery; unknown kinds leave the state untouched.
pub fn apply_change(store: &mut GraphStore, change: &Change) {
    match change {
        Change::Nodes { changes } => {
            apply_node_changes(store, changes);
        }
        Change::EdgeAdd { edge } => {
            store.add_edge(edge.clone());
        }
        Change::EdgeRemove { id } => {
            store.remove_edge(id);
        }
        Change::BulkDelete { node_ids, edge_ids } => {
            for id in node_ids {
                store.remove_node(id);
            }
            for id in edge_ids {
                store.remove_edge(id);
            }
        }
        Change::Replace { nodes, edges } => {
            store.replace_all(nodes.clone(), edges.clone());
        }
        Change::Unknown => {
            tracing::debug!("Ignoring unknown change kind");
        }
    }
}
