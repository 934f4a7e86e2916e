//! Referral gateway binary.
//!
//! ```text
//!     Client ──▶ request id ──▶ security headers ──▶ rate limit ──▶ route guard ──▶ upstream app
//!                                                                        │
//!                                                                        ▼
//!                                                                 hosted auth service
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use referral_gateway::config::{load_config, load_from_env};
use referral_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use referral_gateway::observability::{logging, metrics};
use referral_gateway::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "referral-gateway")]
#[command(about = "Rate limiting and route guard gateway for the referral web app")]
struct Args {
    /// Path to a TOML config file. Defaults plus environment when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(
        &config.observability.log_level,
        config.security.is_development,
    );
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "referral-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        limit = config.rate_limit.limit,
        window_ms = config.rate_limit.window_ms,
        is_development = config.security.is_development,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = GatewayServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
