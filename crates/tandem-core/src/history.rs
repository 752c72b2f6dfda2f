//! Bounded undo/redo snapshot stacks

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Edge, Node};
use crate::store::GraphStore;

/// An immutable capture of nodes and edges only. Viewport and selection are
/// deliberately not part of logical history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
}

impl Snapshot {
    pub fn capture(store: &GraphStore) -> Self {
        Snapshot {
            nodes: store.nodes().map(|n| (n.id.clone(), n.clone())).collect(),
            edges: store.edges().map(|e| (e.id.clone(), e.clone())).collect(),
        }
    }

    /// Build a restored state from this snapshot's topology. For node ids
    /// alive in both, the current state's width/height/measured are kept,
    /// since dimensions are runtime-derived rather than part of history.
    /// Selection is cleared; the current viewport is carried over untouched.
    fn restore(mut self, current: &GraphStore) -> GraphStore {
        for (id, node) in self.nodes.iter_mut() {
            if let Some(live) = current.get_node(id) {
                node.width = live.width;
                node.height = live.height;
                node.measured = live.measured;
            }
            node.selected = false;
            node.dragging = false;
        }
        for edge in self.edges.values_mut() {
            edge.selected = false;
        }
        GraphStore::from_parts(self.nodes, self.edges, current.viewport())
    }
}

/// Bounded undo/redo stacks over a store's topology.
///
/// Deciding when to push (once per user gesture, not per intermediate
/// frame) is the caller's responsibility; this only enforces the stack
/// mechanics.
#[derive(Debug)]
pub struct HistoryStack {
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    max_entries: usize,
}

impl HistoryStack {
    pub fn new(max_entries: usize) -> Self {
        HistoryStack {
            undo: Vec::new(),
            redo: Vec::new(),
            max_entries,
        }
    }

    /// Record the current state as an undo point. A new action invalidates
    /// any redo branch, so the redo stack is cleared entirely.
    pub fn push(&mut self, current: &GraphStore) {
        self.undo.push(Snapshot::capture(current));
        if self.undo.len() > self.max_entries {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    /// Pop the most recent undo point and return the restored state, or
    /// `None` when the stack is empty — a normal outcome, not an error.
    pub fn undo(&mut self, current: &GraphStore) -> Option<GraphStore> {
        let snapshot = self.undo.pop()?;
        self.redo.push(Snapshot::capture(current));
        if self.redo.len() > self.max_entries {
            self.redo.remove(0);
        }
        Some(snapshot.restore(current))
    }

    /// Symmetric to `undo`, popping from the redo stack.
    pub fn redo(&mut self, current: &GraphStore) -> Option<GraphStore> {
        let snapshot = self.redo.pop()?;
        self.undo.push(Snapshot::capture(current));
        if self.undo.len() > self.max_entries {
            self.undo.remove(0);
        }
        Some(snapshot.restore(current))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
