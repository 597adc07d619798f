//! mcpbridge entry point
//!
//! stdout carries the upstream JSON-RPC channel; all diagnostics go to
//! stderr. Config load failures are fatal (non-zero exit); signals trigger
//! a clean shutdown that closes every downstream child.

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcpbridge::{BridgeConfig, BridgeServer};

/// Initialize tracing to stderr (stdout is reserved for the MCP protocol).
///
/// Filtering defaults to `mcpbridge=info` and follows `RUST_LOG`. Set
/// `LOG_FORMAT=json` for structured output.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("mcpbridge=info".parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = BridgeConfig::load()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        servers = config.servers.len(),
        "starting mcpbridge"
    );

    let bridge = BridgeServer::new(Arc::new(config));
    let sweeper = bridge.result_store().spawn_sweeper();

    let service = bridge.clone().serve(rmcp::transport::stdio()).await?;

    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(not(unix))]
    let mut sigterm = ();

    let ct = service.cancellation_token();
    tokio::select! {
        _ = service.waiting() => {
            tracing::info!("upstream client disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            ct.cancel();
        }
        _ = sigterm_recv(&mut sigterm) => {
            tracing::info!("received SIGTERM, shutting down");
            ct.cancel();
        }
    }

    sweeper.abort();
    bridge.shutdown().await;

    tracing::info!("mcpbridge stopped");
    Ok(())
}

#[cfg(unix)]
async fn sigterm_recv(signal: &mut tokio::signal::unix::Signal) -> Option<()> {
    signal.recv().await
}

#[cfg(not(unix))]
async fn sigterm_recv(_signal: &mut ()) -> Option<()> {
    std::future::pending().await
}
