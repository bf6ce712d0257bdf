#![forbid(unsafe_code)]

//! `seed-coordinator` seed orchestration server binary.
//!
//! Bootstraps configuration and the database, starts the agent registry
//! refresh task, and serves the HTTP API until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use seed_coordinator::agent::http_client::HttpAgentClient;
use seed_coordinator::agent::{refresh, AgentClient};
use seed_coordinator::api::{self, AppState};
use seed_coordinator::config::GlobalConfig;
use seed_coordinator::orchestrator::seed_engine::{SeedEngine, SeedTiming};
use seed_coordinator::persistence::agent_repo::AgentRepo;
use seed_coordinator::persistence::db;
use seed_coordinator::persistence::seed_repo::SeedRepo;
use seed_coordinator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "seed-coordinator", about = "MySQL seed orchestration server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("seed-coordinator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(GlobalConfig::load_from_path(&args.config)?);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    let registry = AgentRepo::new(Arc::clone(&db));
    let seeds = SeedRepo::new(Arc::clone(&db));

    let agents: Arc<dyn AgentClient> = Arc::new(HttpAgentClient::new(
        registry.clone(),
        config.agents.request_timeout(),
    )?);
    let engine = SeedEngine::new(
        Arc::clone(&agents),
        seeds.clone(),
        SeedTiming::from(&config.seed),
    );

    match engine.fail_interrupted().await {
        Ok(0) => {}
        Ok(count) => info!(count, "closed seeds interrupted by a previous run"),
        Err(err) => error!(%err, "failed to close interrupted seeds"),
    }

    // ── Start agent refresh ─────────────────────────────
    let ct = CancellationToken::new();
    let refresh_handle = refresh::spawn_refresh_task(
        Arc::clone(&agents),
        registry.clone(),
        config.agents.clone(),
        ct.clone(),
    );
    info!("agent refresh task started");

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        engine: engine.clone(),
        seeds,
        registry,
        agents,
    });

    // ── Serve HTTP API ──────────────────────────────────
    let api_ct = ct.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(state, api_ct).await {
            error!(%err, "http api failed");
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    engine.shutdown().await;

    let _ = tokio::join!(api_handle, refresh_handle);
    info!("seed-coordinator shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
