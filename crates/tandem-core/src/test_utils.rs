//! Fixture builders shared by the tandem-core tests

use crate::model::{Edge, Handle, HandleKind, HandlePosition, Node};
use crate::store::GraphStore;

/// A plain node at the given position.
pub fn node(id: &str, x: f64, y: f64) -> Node {
    Node::new(id, x, y)
}

/// A node carrying the given handles.
pub fn node_with_handles(id: &str, handles: Vec<Handle>) -> Node {
    let mut n = Node::new(id, 0.0, 0.0);
    n.handles = handles;
    n
}

/// A handle with an explicit id.
pub fn handle(id: &str, kind: HandleKind) -> Handle {
    let mut h = Handle::new(kind, HandlePosition::Top);
    h.id = Some(id.to_string());
    h
}

/// A bare edge between two nodes.
pub fn edge(id: &str, source: &str, target: &str) -> Edge {
    Edge::new(id, source, target)
}

/// An edge with named handles on both ends.
pub fn edge_with_handles(
    id: &str,
    source: &str,
    target: &str,
    source_handle: &str,
    target_handle: &str,
) -> Edge {
    let mut e = Edge::new(id, source, target);
    e.source_handle = Some(source_handle.to_string());
    e.target_handle = Some(target_handle.to_string());
    e
}

/// A store holding a linear chain n1 → n2 → ... with one edge per link.
pub fn chain(ids: &[&str]) -> GraphStore {
    let mut store = GraphStore::new();
    for (i, id) in ids.iter().enumerate() {
        store.add_node(node(id, i as f64 * 100.0, 0.0));
    }
    for pair in ids.windows(2) {
        store.add_edge(edge(&format!("{}-{}", pair[0], pair[1]), pair[0], pair[1]));
    }
    store
}

/// Assert the selection mirror invariant: every entity's `selected` flag
/// equals its membership in the matching selection set.
pub fn assert_selection_mirror(store: &GraphStore) {
    for n in store.nodes() {
        assert_eq!(
            n.selected,
            store.selected_nodes().contains(&n.id),
            "node {} selection flag out of sync",
            n.id
        );
    }
    for e in store.edges() {
        assert_eq!(
            e.selected,
            store.selected_edges().contains(&e.id),
            "edge {} selection flag out of sync",
            e.id
        );
    }
}
