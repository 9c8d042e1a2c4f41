//! Armlet debugger server daemon.
//!
//! Serves the session REST API under `/api/v1` and per-session WebSocket
//! events at `/api/v1/session/{id}/events`.
//!
//! Default bind: 127.0.0.1:8774 (override with `ARMLET_BIND`).

use std::net::SocketAddr;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use armlet_server::{api, Config, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,armlet_server=debug")),
        )
        .init();

    info!("starting armlet debugger server");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let bind_addr = std::env::var("ARMLET_BIND")
        .unwrap_or_else(|_| "127.0.0.1:8774".to_string())
        .parse::<SocketAddr>()?;

    let registry = Registry::new(Config::default());
    registry.spawn_sweeper();

    let app = api::router(registry);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("listening on http://{bind_addr}");
    info!("events: ws://{bind_addr}/api/v1/session/{{id}}/events");

    axum::serve(listener, app).await?;

    Ok(())
}
