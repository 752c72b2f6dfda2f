//! HTTP + WebSocket hosting runtime for tandem sessions

pub mod handlers;
pub mod router;
pub mod session;
pub mod websocket;

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tandem_collab::{MemoryBus, MemoryPresence, Transport};
use tandem_core::store::GraphStore;

/// Where the server listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 7340,
        }
    }
}

/// Tunables for the per-session engine pieces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Undo/redo stack bound.
    pub history_limit: usize,
    /// Diagonal paste fan-out step, in flow coordinates.
    pub paste_offset: f64,
    /// Minimum interval between outgoing cursor frames.
    pub cursor_min_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            history_limit: 100,
            paste_offset: 40.0,
            cursor_min_interval_ms: 33,
        }
    }
}

/// Shared server state: one bus and presence registry for all sessions,
/// plus a per-flow store used only to seed late joiners — replayed with the
/// same rules as every peer, never an arbiter.
pub struct ServerState {
    pub bus: Arc<MemoryBus>,
    pub presence: Arc<MemoryPresence>,
    pub engine: EngineConfig,
    flows: DashMap<String, Arc<RwLock<GraphStore>>>,
}

impl ServerState {
    pub fn new(engine: EngineConfig) -> Self {
        let bus = Arc::new(MemoryBus::default());
        let presence = Arc::new(MemoryPresence::new(bus.clone() as Arc<dyn Transport>));
        ServerState {
            bus,
            presence,
            engine,
            flows: DashMap::new(),
        }
    }

    /// The seed store for a flow, created empty on first touch.
    pub fn flow(&self, flow_id: &str) -> Arc<RwLock<GraphStore>> {
        self.flows
            .entry(flow_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(GraphStore::new())))
            .clone()
    }
}

/// The tandem server: axum router over a shared [`ServerState`].
pub struct TandemServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl TandemServer {
    pub fn new(engine: EngineConfig, config: ServerConfig) -> Self {
        TandemServer {
            state: Arc::new(ServerState::new(engine)),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Tandem listening on {}", listener.local_addr()?);
        let router = router::create_router(self.state);
        axum::serve(listener, router).await?;
        Ok(())
    }
}
