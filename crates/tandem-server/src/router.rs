//! Axum router setup for the tandem server

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::{
    handlers::{get_flow, health_check, put_flow},
    websocket::ws_handler,
    ServerState,
};

/// Create the axum router with all routes.
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // WebSocket endpoint: one session per connection
        .route("/ws", get(ws_handler))
        // REST API endpoints
        .route("/api/flows/:id", get(get_flow).put(put_flow))
        .route("/api/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;

    #[test]
    fn router_builds() {
        let state = Arc::new(ServerState::new(EngineConfig::default()));
        let _router = create_router(state);
    }
}
