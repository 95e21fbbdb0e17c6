//! JMESPath relay.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──POST /──▶ ┌──────────┐   ┌───────────┐   ┌───────────┐
//!                        │   http   │──▶│ transform │──▶│  forward  │──▶ Upstream
//!     Client ◀────────── │ handlers │◀──│ (JMESPath)│   │ (reqwest) │◀──
//!                        └──────────┘   └───────────┘   └───────────┘
//!                              │
//!              config · lifecycle · observability (logs, /metrics)
//! ```
//!
//! Configuration comes from an optional TOML file (`--config`) overlaid by
//! environment variables (`JMESPATH_EXPRESSION`, `FORWARD_URL`, ...).

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use jmespath_proxy::config::load_config;
use jmespath_proxy::observability::{init_logging, init_metrics, metrics::spawn_upkeep};
use jmespath_proxy::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "jmespath-proxy", version, about = "Transform JSON with JMESPath and forward it")]
struct Cli {
    /// Optional TOML configuration file; environment variables take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address(),
        log_level = %config.observability.log_level,
        metrics_enabled = config.observability.metrics_enabled,
        "jmespath-proxy starting"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        let handle = init_metrics()?;
        spawn_upkeep(handle.clone());
        Some(handle)
    } else {
        None
    };

    // Bind TCP listener
    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let server = HttpServer::new(config, metrics_handle)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
