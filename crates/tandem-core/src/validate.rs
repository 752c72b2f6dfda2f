//! Composable connection-validation rules

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;

use crate::model::{Connection, Handle, HandleKind, Node};
use crate::store::GraphStore;

/// Why a proposed connection was rejected. Expected and user-facing;
/// returned, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    DuplicateEdge,
    SourceNotFound(String),
    TargetNotFound(String),
    SourceHandleInvalid(String),
    TargetHandleInvalid(String),
    IncompatibleTypes { source: String, target: String },
    MaxConnectionsReached(usize),
    CycleDetected,
}

// Implemented by hand because thiserror's derive treats any field named
// `source` as an error source, which the String in `IncompatibleTypes` is not.
impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::DuplicateEdge => {
                write!(f, "an equivalent edge already exists")
            }
            ConnectionError::SourceNotFound(id) => {
                write!(f, "source node not found: {id}")
            }
            ConnectionError::TargetNotFound(id) => {
                write!(f, "target node not found: {id}")
            }
            ConnectionError::SourceHandleInvalid(id) => {
                write!(f, "source handle missing or not connectable: {id}")
            }
            ConnectionError::TargetHandleInvalid(id) => {
                write!(f, "target handle missing or not connectable: {id}")
            }
            ConnectionError::IncompatibleTypes { source, target } => {
                write!(f, "incompatible connection types: {source} vs {target}")
            }
            ConnectionError::MaxConnectionsReached(max) => {
                write!(f, "connection limit of {max} reached")
            }
            ConnectionError::CycleDetected => {
                write!(f, "connection would create a cycle")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

/// One validation rule. Rules are pure functions over a store snapshot and
/// the proposed connection.
#[derive(Clone)]
pub enum ConnectionRule {
    NoDuplicateEdges,
    NodesExist,
    HandlesValid,
    TypesCompatible,
    MaxConnections(usize),
    NoCycles,
    /// Caller-supplied rule, for composing domain checks into the same pass.
    Custom(fn(&GraphStore, &Connection) -> Result<(), ConnectionError>),
}

impl std::fmt::Debug for ConnectionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRule::NoDuplicateEdges => write!(f, "NoDuplicateEdges"),
            ConnectionRule::NodesExist => write!(f, "NodesExist"),
            ConnectionRule::HandlesValid => write!(f, "HandlesValid"),
            ConnectionRule::TypesCompatible => write!(f, "TypesCompatible"),
            ConnectionRule::MaxConnections(max) => write!(f, "MaxConnections({max})"),
            ConnectionRule::NoCycles => write!(f, "NoCycles"),
            ConnectionRule::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// The default rule set: reject duplicates and dangling endpoints.
pub fn default_rules() -> Vec<ConnectionRule> {
    vec![ConnectionRule::NoDuplicateEdges, ConnectionRule::NodesExist]
}

/// The strict rule set: the defaults plus handle existence/connectability.
pub fn strict_rules() -> Vec<ConnectionRule> {
    let mut rules = default_rules();
    rules.push(ConnectionRule::HandlesValid);
    rules
}

/// Run `rules` in order and stop at the first failure.
pub fn validate(
    store: &GraphStore,
    connection: &Connection,
    rules: &[ConnectionRule],
) -> Result<(), ConnectionError> {
    for rule in rules {
        rule.check(store, connection)?;
    }
    Ok(())
}

impl ConnectionRule {
    pub fn check(
        &self,
        store: &GraphStore,
        connection: &Connection,
    ) -> Result<(), ConnectionError> {
        match self {
            ConnectionRule::NoDuplicateEdges => no_duplicate_edges(store, connection),
            ConnectionRule::NodesExist => nodes_exist(store, connection),
            ConnectionRule::HandlesValid => handles_valid(store, connection),
            ConnectionRule::TypesCompatible => types_compatible(store, connection),
            ConnectionRule::MaxConnections(max) => max_connections(store, connection, *max),
            ConnectionRule::NoCycles => no_cycles(store, connection),
            ConnectionRule::Custom(f) => f(store, connection),
        }
    }
}

/// A `None` handle on the candidate is a wildcard and matches any stored
/// handle; a named candidate handle must match exactly.
fn no_duplicate_edges(store: &GraphStore, connection: &Connection) -> Result<(), ConnectionError> {
    if store.edge_exists(
        &connection.source,
        &connection.target,
        connection.source_handle.as_deref(),
        connection.target_handle.as_deref(),
    ) {
        return Err(ConnectionError::DuplicateEdge);
    }
    Ok(())
}

fn nodes_exist(store: &GraphStore, connection: &Connection) -> Result<(), ConnectionError> {
    if store.get_node(&connection.source).is_none() {
        return Err(ConnectionError::SourceNotFound(connection.source.clone()));
    }
    if store.get_node(&connection.target).is_none() {
        return Err(ConnectionError::TargetNotFound(connection.target.clone()));
    }
    Ok(())
}

/// Find the handle a connection side resolves to: the named handle, or the
/// kind's default id when none is named.
fn resolve_handle<'a>(
    node: &'a Node,
    named: Option<&str>,
    kind: HandleKind,
) -> Option<&'a Handle> {
    let wanted = named.unwrap_or(kind.as_str());
    node.handles
        .iter()
        .find(|h| h.kind == kind && h.resolved_id() == wanted)
}

fn handles_valid(store: &GraphStore, connection: &Connection) -> Result<(), ConnectionError> {
    let source_id = connection
        .source_handle
        .as_deref()
        .unwrap_or(HandleKind::Source.as_str());
    let target_id = connection
        .target_handle
        .as_deref()
        .unwrap_or(HandleKind::Target.as_str());

    let source_ok = store
        .get_node(&connection.source)
        .and_then(|n| resolve_handle(n, connection.source_handle.as_deref(), HandleKind::Source))
        .is_some_and(|h| h.connectable);
    if !source_ok {
        return Err(ConnectionError::SourceHandleInvalid(source_id.to_string()));
    }

    let target_ok = store
        .get_node(&connection.target)
        .and_then(|n| resolve_handle(n, connection.target_handle.as_deref(), HandleKind::Target))
        .is_some_and(|h| h.connectable);
    if !target_ok {
        return Err(ConnectionError::TargetHandleInvalid(target_id.to_string()));
    }
    Ok(())
}

/// Passes when either side lacks a `connect_type` tag; fails only when both
/// sides carry one and they differ.
fn types_compatible(store: &GraphStore, connection: &Connection) -> Result<(), ConnectionError> {
    let tag_of = |node_id: &str, named: Option<&str>, kind: HandleKind| {
        store
            .get_node(node_id)
            .and_then(|n| resolve_handle(n, named, kind))
            .and_then(|h| h.connect_type.clone())
    };
    let source_tag = tag_of(
        &connection.source,
        connection.source_handle.as_deref(),
        HandleKind::Source,
    );
    let target_tag = tag_of(
        &connection.target,
        connection.target_handle.as_deref(),
        HandleKind::Target,
    );
    match (source_tag, target_tag) {
        (Some(source), Some(target)) if source != target => {
            Err(ConnectionError::IncompatibleTypes { source, target })
        }
        _ => Ok(()),
    }
}

/// Each side's (node, handle) pair is counted independently against `max`.
fn max_connections(
    store: &GraphStore,
    connection: &Connection,
    max: usize,
) -> Result<(), ConnectionError> {
    let source_count = store
        .edges()
        .filter(|e| e.source == connection.source && e.source_handle == connection.source_handle)
        .count();
    if source_count >= max {
        return Err(ConnectionError::MaxConnectionsReached(max));
    }
    let target_count = store
        .edges()
        .filter(|e| e.target == connection.target && e.target_handle == connection.target_handle)
        .count();
    if target_count >= max {
        return Err(ConnectionError::MaxConnectionsReached(max));
    }
    Ok(())
}

/// Fails when a directed path already runs from the target back to the
/// source, which adding source→target would close into a cycle. A two-node
/// reversal is just the smallest case; diamonds stay legal.
fn no_cycles(store: &GraphStore, connection: &Connection) -> Result<(), ConnectionError> {
    let mut adjacency: DiGraphMap<&str, ()> = DiGraphMap::new();
    for edge in store.edges() {
        adjacency.add_edge(edge.source.as_str(), edge.target.as_str(), ());
    }
    adjacency.add_node(connection.source.as_str());
    adjacency.add_node(connection.target.as_str());
    if has_path_connecting(
        &adjacency,
        connection.target.as_str(),
        connection.source.as_str(),
        None,
    ) {
        return Err(ConnectionError::CycleDetected);
    }
    Ok(())
}
