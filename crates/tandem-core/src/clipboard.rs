//! Copy/cut/paste over a session's graph state

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{fresh_id, Edge, Node};
use crate::store::GraphStore;

/// Ids created by one paste, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pasted {
    pub node_ids: Vec<String>,
    pub edge_ids: Vec<String>,
}

/// Per-session clipboard. Never broadcast; each session keeps its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clipboard {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    paste_count: u32,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn paste_count(&self) -> u32 {
        self.paste_count
    }

    /// Capture the selected nodes, plus every edge in the graph whose both
    /// endpoints are among them — selected or not, an edge between two
    /// copied nodes always comes along. Resets the paste counter.
    pub fn copy(&mut self, store: &GraphStore) {
        let selected = store.selected_nodes();
        self.nodes = store
            .nodes()
            .filter(|n| selected.contains(&n.id))
            .cloned()
            .collect();
        self.edges = store
            .edges()
            .filter(|e| selected.contains(&e.source) && selected.contains(&e.target))
            .cloned()
            .collect();
        self.paste_count = 0;
    }

    /// Copy, then delete the selection from the store.
    pub fn cut(&mut self, store: &mut GraphStore) {
        self.copy(store);
        store.delete_selected();
    }

    /// Insert clones of the clipboard contents into `store` under fresh ids,
    /// offset by `step * (paste_count + 1)` on both axes so repeated pastes
    /// fan out diagonally. The pasted set replaces the entire selection.
    /// Returns `None` when the clipboard holds no nodes — a normal outcome.
    pub fn paste(&mut self, store: &mut GraphStore, step: f64) -> Option<Pasted> {
        if self.nodes.is_empty() {
            return None;
        }
        let offset = step * f64::from(self.paste_count + 1);
        let mut id_map: BTreeMap<String, String> = BTreeMap::new();
        let mut pasted = Pasted::default();

        for original in &self.nodes {
            let mut node = original.clone();
            node.id = fresh_id();
            node.position.x += offset;
            node.position.y += offset;
            node.selected = false;
            node.dragging = false;
            node.measured = false;
            node.width = None;
            node.height = None;
            id_map.insert(original.id.clone(), node.id.clone());
            pasted.node_ids.push(node.id.clone());
            store.add_node(node);
        }

        for original in &self.edges {
            let (Some(source), Some(target)) =
                (id_map.get(&original.source), id_map.get(&original.target))
            else {
                continue;
            };
            let mut edge = original.clone();
            edge.id = fresh_id();
            edge.source = source.clone();
            edge.target = target.clone();
            edge.selected = false;
            pasted.edge_ids.push(edge.id.clone());
            store.add_edge(edge);
        }

        store.select_nodes(&pasted.node_ids);
        store.select_edges(&pasted.edge_ids);
        self.paste_count += 1;
        Some(pasted)
    }
}
