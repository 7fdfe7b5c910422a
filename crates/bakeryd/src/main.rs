//! bakeryd — the Bakery daemon.
//!
//! Lets one developer run many concurrent checkouts ("slices") of many
//! projects ("pies") on a single host: each slice gets a stable hostname
//! and a set of free loopback ports, and the built-in reverse proxy routes
//! inbound HTTP by `Host` header to the right upstream.
//!
//! # Usage
//!
//! ```text
//! bakeryd
//! bakeryd --port 47123 --data-dir ~/.bakery
//! ```
//!
//! Configuration comes from `BAKERY_*` environment variables (see
//! `config`); the flags above override the environment.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use bakery_allocator::PortAllocator;
use bakery_api::ApiState;
use bakery_orchestrator::{Orchestrator, RouterPort};
use bakery_proxy::RouterProxy;
use bakery_state::Store;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "bakeryd", about = "Bakery daemon — slice hostnames, ports, and routing")]
struct Cli {
    /// Control API port (overrides BAKERY_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for persistent state (overrides BAKERY_DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bakeryd=debug,bakery=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("Bakery daemon starting");

    // ── State store ────────────────────────────────────────────────

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join("bakery.db");
    let store = Store::open(&db_path).await?;
    info!(path = ?db_path, "store opened");

    // ── Router proxy ───────────────────────────────────────────────
    //
    // The proxy binds before the control API so the resolved router port
    // can flow into every route URL the orchestrator synthesizes.

    let router_listener = bakery_proxy::bind_first_free(&config.router_ports).await?;
    let resolved_router_port = router_listener.local_addr()?.port();
    let router_port = RouterPort::unresolved();
    router_port.set(resolved_router_port);
    info!(port = resolved_router_port, "router proxy bound");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let proxy = RouterProxy::new(store.clone());
    let proxy_handle = tokio::spawn(async move {
        if let Err(e) = proxy.serve(router_listener, shutdown_rx).await {
            tracing::error!(error = %e, "router proxy error");
        }
    });

    // ── Orchestrator ───────────────────────────────────────────────

    let allocator = Arc::new(PortAllocator::new(
        config.port_range_start,
        config.port_range_end,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        allocator,
        config.host_suffix.clone(),
        router_port.clone(),
    ));
    info!(
        range_start = config.port_range_start,
        range_end = config.port_range_end,
        host_suffix = %config.host_suffix,
        "orchestrator initialized"
    );

    // ── Control API ────────────────────────────────────────────────

    let api_state = ApiState {
        store,
        orchestrator,
        host: config.host.clone(),
        port: config.port,
        router_port,
    };
    let router = bakery_api::build_router(api_state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "control API starting");

    // Graceful shutdown on Ctrl-C; the proxy follows via the watch channel.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = proxy_handle.await;
    info!("Bakery daemon stopped");
    Ok(())
}
