//! CLI command implementations

use std::path::{Path, PathBuf};

use serde::Deserialize;

use tandem_server::{EngineConfig, ServerConfig, TandemServer};

/// On-disk configuration, all optional. CLI flags win over file values.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: ServerConfig,
    engine: EngineConfig,
}

pub async fn serve(
    config_path: PathBuf,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let file = load_config(&config_path)?;

    let mut server_config = file.server;
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }

    tracing::info!(
        "Starting tandem server on {}:{}",
        server_config.host,
        server_config.port
    );
    let server = TandemServer::new(file.engine, server_config);
    server.start().await
}

fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    if !path.exists() {
        tracing::debug!("No config file at {}, using defaults", path.display());
        return Ok(FileConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    let config = toml::from_str(&text)?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}
