//! REST handlers: flow export/import and health

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use tandem_collab::{change_topic, Change, ChangeEnvelope, Transport};
use tandem_core::serialize::{export, import, FlowFile};

use crate::ServerState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Export a flow's current seed state in the versioned serialized form.
pub async fn get_flow(
    Path(flow_id): Path<String>,
    State(state): State<Arc<ServerState>>,
) -> Json<FlowFile> {
    let seed = state.flow(&flow_id);
    let store = seed.read().await;
    Json(export(&store))
}

/// Import a flow: replace the seed state and broadcast a full-state
/// replace so every connected session resets to it.
pub async fn put_flow(
    Path(flow_id): Path<String>,
    State(state): State<Arc<ServerState>>,
    Json(file): Json<FlowFile>,
) -> impl IntoResponse {
    let store = import(file);
    let change = Change::Replace {
        nodes: store.nodes_list(),
        edges: store.edges_list(),
    };
    let seed = state.flow(&flow_id);
    *seed.write().await = store;

    // The server's identity never collides with a session's, so every
    // session applies this.
    let envelope = ChangeEnvelope {
        origin: format!("server:{}", tandem_core::fresh_id()),
        change,
    };
    match serde_json::to_string(&envelope) {
        Ok(payload) => {
            state.bus.broadcast(&change_topic(&flow_id), payload);
            tracing::info!("Flow {} replaced via import", flow_id);
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            tracing::warn!("Failed to serialize replace envelope: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use tandem_core::model::Node;

    #[tokio::test]
    async fn get_flow_exports_seed_state() {
        let state = Arc::new(ServerState::new(EngineConfig::default()));
        {
            let seed = state.flow("f");
            seed.write().await.add_node(Node::new("n1", 1.0, 2.0));
        }
        let Json(file) = get_flow(Path("f".to_string()), State(state)).await;
        assert_eq!(file.nodes.len(), 1);
        assert_eq!(file.nodes[0].id, "n1");
    }

    #[tokio::test]
    async fn put_flow_replaces_seed_and_broadcasts() {
        let state = Arc::new(ServerState::new(EngineConfig::default()));
        let mut rx = state.bus.subscribe(&change_topic("f"));

        let mut store = tandem_core::store::GraphStore::new();
        store.add_node(Node::new("n1", 0.0, 0.0));
        let file = export(&store);
        put_flow(Path("f".to_string()), State(state.clone()), Json(file))
            .await
            .into_response();

        let payload = rx.recv().await.unwrap();
        let envelope: ChangeEnvelope = serde_json::from_str(&payload).unwrap();
        assert!(envelope.origin.starts_with("server:"));
        assert!(matches!(envelope.change, Change::Replace { .. }));
        assert_eq!(state.flow("f").read().await.node_count(), 1);
    }
}
