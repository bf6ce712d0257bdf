//! HTTP API: the seed request entry point, agent registration, and the
//! read-only audit views over seed operations and their steps.

mod errors;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::AgentClient;
use crate::config::GlobalConfig;
use crate::orchestrator::seed_engine::SeedEngine;
use crate::persistence::agent_repo::AgentRepo;
use crate::persistence::seed_repo::SeedRepo;
use crate::{AppError, Result};

/// Shared state handed to every request handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Seed workflow engine.
    pub engine: SeedEngine,
    /// Seed operation and step log store.
    pub seeds: SeedRepo,
    /// Agent registry.
    pub registry: AgentRepo,
    /// Client used for on-demand agent snapshots.
    pub agents: Arc<dyn AgentClient>,
}

/// Bind `config.http_port` on all interfaces and serve until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the port cannot be bound, or
/// `AppError::Io` if the server fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve the API on an already-bound listener until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http api listening");
    }

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await?;

    info!("http api stopped");
    Ok(())
}
