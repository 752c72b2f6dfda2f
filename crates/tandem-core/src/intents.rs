//! Batched mutation intents from the rendering layer
//!
//! These are the entry points a rendering frontend drives the store with,
//! and the same payloads the collaboration protocol replays on peers.
//! Intents addressing ids that no longer exist are silently skipped.

use serde::{Deserialize, Serialize};

use crate::model::Position;
use crate::store::{GraphStore, NodePatch};

/// One change to a node, addressed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeChange {
    /// Node moved (or is mid-drag).
    Position {
        id: String,
        position: Position,
        #[serde(default)]
        dragging: bool,
    },
    /// Rendering layer reported real dimensions.
    Dimensions { id: String, width: f64, height: f64 },
    Remove { id: String },
}

/// One change to an edge, addressed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeChange {
    Remove { id: String },
}

/// Replacement selection from the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionChange {
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub edge_ids: Vec<String>,
}

/// Apply a batch of node changes in order.
pub fn apply_node_changes(store: &mut GraphStore, changes: &[NodeChange]) {
    for change in changes {
        match change {
            NodeChange::Position {
                id,
                position,
                dragging,
            } => {
                store.update_node(
                    id,
                    NodePatch {
                        position: Some(*position),
                        dragging: Some(*dragging),
                        ..NodePatch::default()
                    },
                );
            }
            NodeChange::Dimensions { id, width, height } => {
                store.update_node(
                    id,
                    NodePatch {
                        width: Some(*width),
                        height: Some(*height),
                        measured: Some(true),
                        ..NodePatch::default()
                    },
                );
            }
            NodeChange::Remove { id } => {
                store.remove_node(id);
            }
        }
    }
}

/// Apply a batch of edge changes in order.
pub fn apply_edge_changes(store: &mut GraphStore, changes: &[EdgeChange]) {
    for change in changes {
        match change {
            EdgeChange::Remove { id } => {
                store.remove_edge(id);
            }
        }
    }
}

/// Apply a replacement selection to both node and edge selections.
pub fn apply_selection_change(store: &mut GraphStore, change: &SelectionChange) {
    store.select_nodes(&change.node_ids);
    store.select_edges(&change.edge_ids);
}
