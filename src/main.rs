//! Tandem CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Collaborative flow diagram server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the collaboration server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Config file path
        #[arg(short, long, default_value = "tandem.toml")]
        config: PathBuf,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("tandem={}", log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Tandem v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { port, host, config } => commands::serve(config, host, port).await,
        Commands::Version => {
            println!("Tandem v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
