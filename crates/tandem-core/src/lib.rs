//! Tandem Core — graph state engine for collaborative flow editing
//!
//! One `GraphStore` per session, pure mutation functions, composable
//! connection validation, bounded undo/redo, and a clipboard. Nothing here
//! performs I/O or blocks; cross-session synchronization lives in
//! `tandem-collab`.

pub mod clipboard;
pub mod history;
pub mod intents;
pub mod model;
pub mod serialize;
pub mod store;
pub mod validate;


#[cfg(test)]
pub mod test_utils;

pub use clipboard::{Clipboard, Pasted};
pub use history::{HistoryStack, Snapshot};
pub use intents::{apply_edge_changes, apply_node_changes, apply_selection_change, EdgeChange, NodeChange, SelectionChange};
pub use model::{fresh_id, Connection, Edge, EdgeMarker, Handle, HandleKind, HandlePosition, MarkerKind, Node, Position, Rect, Viewport};
pub use serialize::{export, import, load_flow, save_flow, FlowFile};
pub use store::{EdgePatch, GraphStore, NodePatch, ViewportPatch};
pub use validate::{default_rules, strict_rules, validate, ConnectionError, ConnectionRule};
