//! swim-heat-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use swim_heat_gateway::config::{GatewayConfig, LogFormat};
use swim_heat_gateway::persistence::{InMemoryStore, PostgresStore};
use swim_heat_gateway::server::{build_app, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(
        addr = %config.listen_addr,
        persistence = config.persistence_enabled,
        "starting swim-heat-gateway"
    );

    // Build store and service layer
    let state = if config.persistence_enabled {
        let store = PostgresStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            config.database_connect_timeout(),
        )
        .await
        .context("cannot connect to PostgreSQL")?;
        build_state(
            Arc::new(store),
            config.event_bus_capacity,
            config.resolution_date,
        )
    } else {
        let store = match &config.meet_seed_path {
            Some(path) => InMemoryStore::load_seed(path)
                .await
                .context("cannot load meet seed")?,
            None => {
                tracing::warn!("no MEET_SEED_PATH set; starting with no events");
                InMemoryStore::new()
            }
        };
        build_state(
            Arc::new(store),
            config.event_bus_capacity,
            config.resolution_date,
        )
    };

    // Build router
    let app = build_app(state, config.request_timeout());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
