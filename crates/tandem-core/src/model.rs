//! Core data structures for flow graphs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Coin a fresh unique entity id.
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A point in flow coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

/// Which side of a connection a handle serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum HandleKind {
    #[default]
    Source,
    Target,
}

impl HandleKind {
    /// Decode a string tag. Unknown tags fall back to `Source`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "source" => HandleKind::Source,
            "target" => HandleKind::Target,
            _ => HandleKind::Source,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::Source => "source",
            HandleKind::Target => "target",
        }
    }
}

impl From<String> for HandleKind {
    fn from(s: String) -> Self {
        HandleKind::from_tag(&s)
    }
}

impl From<HandleKind> for String {
    fn from(k: HandleKind) -> String {
        k.as_str().to_string()
    }
}

/// Where on the node a handle is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum HandlePosition {
    #[default]
    Top,
    Bottom,
    Left,
    Right,
}

impl HandlePosition {
    /// Decode a string tag. Unknown tags fall back to `Top`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "top" => HandlePosition::Top,
            "bottom" => HandlePosition::Bottom,
            "left" => HandlePosition::Left,
            "right" => HandlePosition::Right,
            _ => HandlePosition::Top,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandlePosition::Top => "top",
            HandlePosition::Bottom => "bottom",
            HandlePosition::Left => "left",
            HandlePosition::Right => "right",
        }
    }
}

impl From<String> for HandlePosition {
    fn from(s: String) -> Self {
        HandlePosition::from_tag(&s)
    }
}

impl From<HandlePosition> for String {
    fn from(p: HandlePosition) -> String {
        p.as_str().to_string()
    }
}

/// A typed, positioned connection point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    /// Optional explicit id; defaults to the kind's tag name when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: HandleKind,
    #[serde(default)]
    pub position: HandlePosition,
    #[serde(default = "default_true")]
    pub connectable: bool,
    /// Optional type tag used only for connection compatibility checks.
    #[serde(default)]
    pub connect_type: Option<String>,
}

impl Handle {
    pub fn new(kind: HandleKind, position: HandlePosition) -> Self {
        Handle {
            id: None,
            kind,
            position,
            connectable: true,
            connect_type: None,
        }
    }

    /// The id this handle answers to: the explicit id, or the kind's tag name.
    pub fn resolved_id(&self) -> &str {
        self.id.as_deref().unwrap_or(self.kind.as_str())
    }
}

/// Edge endpoint marker shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum MarkerKind {
    #[default]
    Arrow,
    ArrowClosed,
}

impl MarkerKind {
    /// Decode a string tag. Unknown tags fall back to `Arrow`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "arrow" => MarkerKind::Arrow,
            "arrowclosed" => MarkerKind::ArrowClosed,
            _ => MarkerKind::Arrow,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerKind::Arrow => "arrow",
            MarkerKind::ArrowClosed => "arrowclosed",
        }
    }
}

impl From<String> for MarkerKind {
    fn from(s: String) -> Self {
        MarkerKind::from_tag(&s)
    }
}

impl From<MarkerKind> for String {
    fn from(k: MarkerKind) -> String {
        k.as_str().to_string()
    }
}

/// Marker configuration for one end of an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMarker {
    #[serde(rename = "type", default)]
    pub kind: MarkerKind,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

/// A single node in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub position: Position,
    /// Free-form payload, opaque at this layer.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub handles: Vec<Handle>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    /// True once the rendering layer reported real dimensions.
    #[serde(default)]
    pub measured: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub dragging: bool,
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

impl Node {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Node {
            id: id.into(),
            position: Position::new(x, y),
            data: BTreeMap::new(),
            type_tag: String::new(),
            handles: Vec::new(),
            width: None,
            height: None,
            measured: false,
            selected: false,
            dragging: false,
            draggable: true,
            connectable: true,
            selectable: true,
            deletable: true,
            parent_id: None,
            style: None,
            class: None,
            z_index: 0,
        }
    }
}

/// A directed edge between two nodes in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
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
    #[serde(default)]
    pub selected: bool,
    #[serde(default = "default_true")]
    pub selectable: bool,
    #[serde(default = "default_true")]
    pub deletable: bool,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            type_tag: String::new(),
            label: None,
            marker_start: None,
            marker_end: None,
            style: None,
            animated: false,
            selected: false,
            selectable: true,
            deletable: true,
            z_index: 0,
            data: BTreeMap::new(),
        }
    }
}

/// Pan/zoom state of one session's view onto the flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Axis-aligned bounding box in flow coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A proposed connection between two nodes, not yet an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Connection {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Build the edge this connection would create, with a fresh id.
    pub fn into_edge(self) -> Edge {
        Edge {
            source_handle: self.source_handle,
            target_handle: self.target_handle,
            ..Edge::new(fresh_id(), self.source, self.target)
        }
    }
}

fn default_true() -> bool {
    true
}
