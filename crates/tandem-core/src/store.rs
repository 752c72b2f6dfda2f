//! Per-session graph state: nodes, edges, viewport, selection

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Edge, Node, Position, Rect, Viewport};

/// Partial update for a node. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePatch {
    pub position: Option<Position>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub measured: Option<bool>,
    pub dragging: Option<bool>,
    pub data: Option<BTreeMap<String, String>>,
    pub style: Option<String>,
    pub z_index: Option<i32>,
}

/// Partial update for an edge. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgePatch {
    pub label: Option<String>,
    pub animated: Option<bool>,
    pub style: Option<String>,
    pub z_index: Option<i32>,
    pub data: Option<BTreeMap<String, String>>,
}

/// Partial update for the viewport. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewportPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub zoom: Option<f64>,
}

/// The graph state owned by one session.
///
/// Nodes and edges are keyed by id in ordered maps so iteration and
/// serialization are deterministically id-sorted. Invariant: every entity's
/// `selected` flag equals its membership in the matching selection set.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GraphStore {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    viewport: Viewport,
    selected_nodes: BTreeSet<String>,
    selected_edges: BTreeSet<String>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("node_count", &self.nodes.len())
            .field("edge_count", &self.edges.len())
            .field("selected_nodes", &self.selected_nodes.len())
            .field("selected_edges", &self.selected_edges.len())
            .finish()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from parts, deriving the selection sets from the
    /// per-entity `selected` flags.
    pub fn from_parts(
        nodes: BTreeMap<String, Node>,
        edges: BTreeMap<String, Edge>,
        viewport: Viewport,
    ) -> Self {
        let selected_nodes = nodes
            .values()
            .filter(|n| n.selected)
            .map(|n| n.id.clone())
            .collect();
        let selected_edges = edges
            .values()
            .filter(|e| e.selected)
            .map(|e| e.id.clone())
            .collect();
        GraphStore {
            nodes,
            edges,
            viewport,
            selected_nodes,
            selected_edges,
        }
    }

    // ── Insertion ───────────────────────────────────────────

    /// Insert a node, overwriting any node with the same id.
    pub fn add_node(&mut self, node: Node) {
        if node.selected {
            self.selected_nodes.insert(node.id.clone());
        } else {
            self.selected_nodes.remove(&node.id);
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.add_node(node);
        }
    }

    /// Insert an edge, overwriting any edge with the same id.
    pub fn add_edge(&mut self, edge: Edge) {
        if edge.selected {
            self.selected_edges.insert(edge.id.clone());
        } else {
            self.selected_edges.remove(&edge.id);
        }
        self.edges.insert(edge.id.clone(), edge);
    }

    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = Edge>) {
        for edge in edges {
            self.add_edge(edge);
        }
    }

    /// Replace all nodes and edges at once, rebuilding the selection sets
    /// from the incoming `selected` flags. Viewport is left untouched.
    pub fn replace_all(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        self.edges = edges.into_iter().map(|e| (e.id.clone(), e)).collect();
        self.selected_nodes = self
            .nodes
            .values()
            .filter(|n| n.selected)
            .map(|n| n.id.clone())
            .collect();
        self.selected_edges = self
            .edges
            .values()
            .filter(|e| e.selected)
            .map(|e| e.id.clone())
            .collect();
    }

    // ── Lookup ──────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over all edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn nodes_list(&self) -> Vec<Node> {
        self.nodes.values().cloned().collect()
    }

    pub fn edges_list(&self) -> Vec<Edge> {
        self.edges.values().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn selected_nodes(&self) -> &BTreeSet<String> {
        &self.selected_nodes
    }

    pub fn selected_edges(&self) -> &BTreeSet<String> {
        &self.selected_edges
    }

    /// All edges touching the node on either side.
    pub fn edges_for_node(&self, id: &str) -> Vec<&Edge> {
        self.edges
            .values()
            .filter(|e| e.source == id || e.target == id)
            .collect()
    }

    /// True if an edge matches source and target and, for each handle
    /// argument that is `Some`, that handle too. A `None` handle argument is
    /// a wildcard on the query side only.
    pub fn edge_exists(
        &self,
        source: &str,
        target: &str,
        source_handle: Option<&str>,
        target_handle: Option<&str>,
    ) -> bool {
        self.edges.values().any(|e| {
            e.source == source
                && e.target == target
                && source_handle.is_none_or(|h| e.source_handle.as_deref() == Some(h))
                && target_handle.is_none_or(|h| e.target_handle.as_deref() == Some(h))
        })
    }

    // ── Mutation ────────────────────────────────────────────

    /// Apply a patch to a node. No-op when the id is absent, so duplicate or
    /// late remote messages are harmless.
    pub fn update_node(&mut self, id: &str, patch: NodePatch) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if let Some(position) = patch.position {
            node.position = position;
        }
        if let Some(width) = patch.width {
            node.width = Some(width);
        }
        if let Some(height) = patch.height {
            node.height = Some(height);
        }
        if let Some(measured) = patch.measured {
            node.measured = measured;
        }
        if let Some(dragging) = patch.dragging {
            node.dragging = dragging;
        }
        if let Some(data) = patch.data {
            node.data = data;
        }
        if let Some(style) = patch.style {
            node.style = Some(style);
        }
        if let Some(z_index) = patch.z_index {
            node.z_index = z_index;
        }
    }

    /// Apply an arbitrary mutation to a node. No-op when the id is absent.
    /// The `selected` flag is re-synced from the selection set afterwards,
    /// so the closure cannot break the mirror invariant.
    pub fn update_node_with(&mut self, id: &str, f: impl FnOnce(&mut Node)) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        f(node);
        node.selected = self.selected_nodes.contains(id);
    }

    /// Apply a patch to an edge. No-op when the id is absent.
    pub fn update_edge(&mut self, id: &str, patch: EdgePatch) {
        let Some(edge) = self.edges.get_mut(id) else {
            return;
        };
        if let Some(label) = patch.label {
            edge.label = Some(label);
        }
        if let Some(animated) = patch.animated {
            edge.animated = animated;
        }
        if let Some(style) = patch.style {
            edge.style = Some(style);
        }
        if let Some(z_index) = patch.z_index {
            edge.z_index = z_index;
        }
        if let Some(data) = patch.data {
            edge.data = data;
        }
    }

    /// Remove a node, cascading removal of every edge touching it and
    /// deselecting it. Idempotent.
    pub fn remove_node(&mut self, id: &str) {
        if self.nodes.remove(id).is_none() {
            return;
        }
        let dangling: Vec<String> = self
            .edges
            .values()
            .filter(|e| e.source == id || e.target == id)
            .map(|e| e.id.clone())
            .collect();
        for edge_id in dangling {
            self.edges.remove(&edge_id);
            self.selected_edges.remove(&edge_id);
        }
        self.selected_nodes.remove(id);
    }

    /// Remove an edge and deselect it. Idempotent.
    pub fn remove_edge(&mut self, id: &str) {
        self.edges.remove(id);
        self.selected_edges.remove(id);
    }

    // ── Selection ───────────────────────────────────────────

    /// Select a node. With `multi` false the entire selection (nodes and
    /// edges) is replaced by just this node; with `multi` true it is added.
    /// No-op when the id is absent.
    pub fn select_node(&mut self, id: &str, multi: bool) {
        if !self.nodes.contains_key(id) {
            return;
        }
        if !multi {
            self.selected_nodes.clear();
            self.selected_edges.clear();
        }
        self.selected_nodes.insert(id.to_string());
        self.sync_selection_flags();
    }

    /// Select an edge, with the same `multi` semantics as `select_node`.
    pub fn select_edge(&mut self, id: &str, multi: bool) {
        if !self.edges.contains_key(id) {
            return;
        }
        if !multi {
            self.selected_nodes.clear();
            self.selected_edges.clear();
        }
        self.selected_edges.insert(id.to_string());
        self.sync_selection_flags();
    }

    /// Replace the node selection with exactly the subset of `ids` that
    /// exist. Edge selection is untouched.
    pub fn select_nodes(&mut self, ids: &[String]) {
        self.selected_nodes = ids
            .iter()
            .filter(|id| self.nodes.contains_key(*id))
            .cloned()
            .collect();
        self.sync_selection_flags();
    }

    /// Replace the edge selection with exactly the subset of `ids` that
    /// exist. Node selection is untouched.
    pub fn select_edges(&mut self, ids: &[String]) {
        self.selected_edges = ids
            .iter()
            .filter(|id| self.edges.contains_key(*id))
            .cloned()
            .collect();
        self.sync_selection_flags();
    }

    pub fn clear_selection(&mut self) {
        self.selected_nodes.clear();
        self.selected_edges.clear();
        self.sync_selection_flags();
    }

    pub fn select_all(&mut self) {
        self.selected_nodes = self.nodes.keys().cloned().collect();
        self.selected_edges = self.edges.keys().cloned().collect();
        self.sync_selection_flags();
    }

    /// Remove all selected nodes first (their cascade takes dependent edges
    /// with them), then all selected edges.
    pub fn delete_selected(&mut self) {
        let node_ids: Vec<String> = self.selected_nodes.iter().cloned().collect();
        for id in node_ids {
            self.remove_node(&id);
        }
        let edge_ids: Vec<String> = self.selected_edges.iter().cloned().collect();
        for id in edge_ids {
            self.remove_edge(&id);
        }
    }

    /// Re-derive every entity's `selected` flag from the selection sets.
    fn sync_selection_flags(&mut self) {
        for (id, node) in self.nodes.iter_mut() {
            node.selected = self.selected_nodes.contains(id);
        }
        for (id, edge) in self.edges.iter_mut() {
            edge.selected = self.selected_edges.contains(id);
        }
    }

    // ── Viewport ────────────────────────────────────────────

    /// Merge provided fields onto the current viewport.
    pub fn update_viewport(&mut self, patch: ViewportPatch) {
        if let Some(x) = patch.x {
            self.viewport.x = x;
        }
        if let Some(y) = patch.y {
            self.viewport.y = y;
        }
        if let Some(zoom) = patch.zoom {
            self.viewport.zoom = zoom;
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    // ── Geometry ────────────────────────────────────────────

    /// Bounding box over the flow's nodes. `None` when there are no nodes.
    ///
    /// Before any node has been measured there are no real sizes, so the box
    /// is computed over raw positions only. Once at least one node is
    /// measured, the box covers measured nodes' actual rectangles and
    /// ignores unmeasured ones.
    pub fn bounds(&self) -> Option<Rect> {
        if self.nodes.is_empty() {
            return None;
        }
        let any_measured = self.nodes.values().any(|n| n.measured);
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        if any_measured {
            for node in self.nodes.values().filter(|n| n.measured) {
                let width = node.width.unwrap_or(0.0);
                let height = node.height.unwrap_or(0.0);
                min_x = min_x.min(node.position.x);
                min_y = min_y.min(node.position.y);
                max_x = max_x.max(node.position.x + width);
                max_y = max_y.max(node.position.y + height);
            }
        } else {
            for node in self.nodes.values() {
                min_x = min_x.min(node.position.x);
                min_y = min_y.min(node.position.y);
                max_x = max_x.max(node.position.x);
                max_y = max_y.max(node.position.y);
            }
        }
        Some(Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}
