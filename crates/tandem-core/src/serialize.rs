//! Versioned flow serialization
//!
//! The on-disk form carries nodes, edges, and viewport with node/edge lists
//! sorted by id for determinism. Transient runtime fields (selected,
//! dragging, measured, width, height) are excluded on export and reset to
//! defaults on import.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Edge, EdgeMarker, Handle, Node, Position, Viewport};
use crate::store::GraphStore;

/// Current flow file format version.
pub const FORMAT_VERSION: u32 = 1;

/// A node as serialized: durable fields only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub id: String,
    pub position: Position,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub handles: Vec<Handle>,
    #[serde(default = "default_true")]
    pub draggable: bool,
    #[serde(default = "default_true")]
    pub connectable: bool,
    #[serde(default = "default_true")]
    pub selectable: bool,
    #[serde(default = "default_true")]
    pub deletable: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub z_index: i32,
}

impl From<&Node> for SerializedNode {
    fn from(node: &Node) -> Self {
        SerializedNode {
            id: node.id.clone(),
            position: node.position,
            data: node.data.clone(),
            type_tag: node.type_tag.clone(),
            handles: node.handles.clone(),
            draggable: node.draggable,
            connectable: node.connectable,
            selectable: node.selectable,
            deletable: node.deletable,
            parent_id: node.parent_id.clone(),
            style: node.style.clone(),
            class: node.class.clone(),
            z_index: node.z_index,
        }
    }
}

impl From<SerializedNode> for Node {
    fn from(s: SerializedNode) -> Self {
        let mut node = Node::new(s.id, s.position.x, s.position.y);
        node.data = s.data;
        node.type_tag = s.type_tag;
        node.handles = s.handles;
        node.draggable = s.draggable;
        node.connectable = s.connectable;
        node.selectable = s.selectable;
        node.deletable = s.deletable;
        node.parent_id = s.parent_id;
        node.style = s.style;
        node.class = s.class;
        node.z_index = s.z_index;
        node
    }
}

/// An edge as serialized: durable fields only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub marker_start: Option<EdgeMarker>,
    #[serde(default)]
    pub marker_end: Option<EdgeMarker>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub animated: bool,
    #[serde(default = "default_true")]
    pub selectable: bool,
    #[serde(default = "default_true")]
    pub deletable: bool,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl From<&Edge> for SerializedEdge {
    fn from(edge: &Edge) -> Self {
        SerializedEdge {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_handle.clone(),
            target_handle: edge.target_handle.clone(),
            type_tag: edge.type_tag.clone(),
            label: edge.label.clone(),
            marker_start: edge.marker_start.clone(),
            marker_end: edge.marker_end.clone(),
            style: edge.style.clone(),
            animated: edge.animated,
            selectable: edge.selectable,
            deletable: edge.deletable,
            z_index: edge.z_index,
            data: edge.data.clone(),
        }
    }
}

impl From<SerializedEdge> for Edge {
    fn from(s: SerializedEdge) -> Self {
        let mut edge = Edge::new(s.id, s.source, s.target);
        edge.source_handle = s.source_handle;
        edge.target_handle = s.target_handle;
        edge.type_tag = s.type_tag;
        edge.label = s.label;
        edge.marker_start = s.marker_start;
        edge.marker_end = s.marker_end;
        edge.style = s.style;
        edge.animated = s.animated;
        edge.selectable = s.selectable;
        edge.deletable = s.deletable;
        edge.z_index = s.z_index;
        edge.data = s.data;
        edge
    }
}

/// The serialized form of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFile {
    pub version: u32,
    pub nodes: Vec<SerializedNode>,
    pub edges: Vec<SerializedEdge>,
    pub viewport: Viewport,
}

/// Export a store. Node and edge lists come out sorted by id because the
/// store iterates in id order.
pub fn export(store: &GraphStore) -> FlowFile {
    FlowFile {
        version: FORMAT_VERSION,
        nodes: store.nodes().map(SerializedNode::from).collect(),
        edges: store.edges().map(SerializedEdge::from).collect(),
        viewport: store.viewport(),
    }
}

/// Build a store from a serialized flow. Transient fields come back as
/// defaults, so nothing is selected, dragging, or measured.
pub fn import(file: FlowFile) -> GraphStore {
    let nodes = file
        .nodes
        .into_iter()
        .map(Node::from)
        .map(|n| (n.id.clone(), n))
        .collect();
    let edges = file
        .edges
        .into_iter()
        .map(Edge::from)
        .map(|e| (e.id.clone(), e))
        .collect();
    GraphStore::from_parts(nodes, edges, file.viewport)
}

/// Write a flow to disk as pretty-printed JSON.
pub fn save_flow(store: &GraphStore, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&export(store))?;
    std::fs::write(path, json)?;
    tracing::debug!("Flow saved: {}", path.display());
    Ok(())
}

/// Read a flow back from disk.
pub fn load_flow(path: &Path) -> anyhow::Result<GraphStore> {
    let json = std::fs::read_to_string(path)?;
    let file: FlowFile = serde_json::from_str(&json)?;
    tracing::debug!("Flow loaded: {}", path.display());
    Ok(import(file))
}

fn default_true() -> bool {
    true
}
