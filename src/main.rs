//! HTTP request proxy service.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                  REQUEST PROXY                    │
//!   POST /proxy            │  ┌─────────┐    ┌────────────┐    ┌───────────┐  │
//!   ───────────────────────┼─▶│  http   │───▶│ dispatcher │───▶│ transport │──┼──▶ Target
//!                          │  │ server  │    │ + registry │    │socket/nat.│  │    Server
//!   ProxyResult (JSON)     │  └─────────┘    └────────────┘    └─────┬─────┘  │
//!   ◀──────────────────────┼────────────────── assembler ◀───────────┘        │
//!                          │                                                  │
//!                          │  config · lifecycle · observability · net/tls    │
//!                          └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use request_proxy::config::{load_config, ServiceConfig};
use request_proxy::lifecycle::{wait_for_signal, Shutdown};
use request_proxy::net::load_tls_config;
use request_proxy::observability::{logging, metrics};
use request_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "request-proxy")]
#[command(about = "Executes HTTP requests described as JSON", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability);

    tracing::info!("request-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_size = config.listener.max_body_size,
        prefix = %config.api.prefix,
        cors = config.cors.enabled,
        result_timeout_secs = ?config.timeouts.result_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signals = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal(&signals).await;
    });

    let tls = config.listener.tls.clone();
    let server = HttpServer::new(config);

    match tls {
        Some(tls) => {
            let addr: SocketAddr = server.config().listener.bind_address.parse()?;
            let rustls = load_tls_config(&tls).await?;
            server.run_tls(addr, rustls, server_shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, server_shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
