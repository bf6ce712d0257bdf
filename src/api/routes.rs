//! Route table and request handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::models::agent::{Agent, AgentSnapshot};
use crate::models::seed::{SeedOperation, SeedStep};
use crate::orchestrator::seed_engine::ActiveSeedInfo;
use crate::{AppError, Result};

use super::AppState;

const DEFAULT_LIST_LIMIT: u32 = 100;

/// Body of `POST /api/agents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAgentRequest {
    /// Host the agent runs on.
    pub hostname: String,
    /// Agent API port.
    pub port: u16,
    /// Capability token the coordinator must present.
    pub token: String,
}

/// Body of `POST /api/seeds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRequest {
    /// Host to overwrite.
    pub target: String,
    /// Host to clone from.
    pub source: String,
}

/// Response of `POST /api/seeds`.
#[derive(Debug, Clone, Serialize)]
pub struct SeedResponse {
    /// The persisted operation.
    pub operation: SeedOperation,
    /// Target state read right after the seed was scheduled.
    pub target_snapshot: AgentSnapshot,
}

/// Query string of `GET /api/seeds`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    /// Maximum number of operations to return.
    pub limit: Option<u32>,
}

/// Build the API router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agents", get(list_agents).post(submit_agent))
        .route("/api/agents/{hostname}", get(agent_snapshot))
        .route("/api/seeds", get(list_seeds).post(request_seed))
        .route("/api/seeds/active", get(active_seeds))
        .route("/api/seeds/{id}", get(get_seed))
        .route("/api/seeds/{id}/steps", get(seed_steps))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_agent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitAgentRequest>,
) -> Result<Json<String>> {
    if request.hostname.is_empty() || request.token.is_empty() {
        return Err(AppError::InvalidRequest(
            "hostname and token are required".into(),
        ));
    }
    state
        .registry
        .submit(&request.hostname, request.port, &request.token)
        .await?;
    Ok(Json(request.hostname))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Agent>>> {
    Ok(Json(state.registry.list().await?))
}

async fn agent_snapshot(
    State(state): State<Arc<AppState>>,
    Path(hostname): Path<String>,
) -> Result<Json<AgentSnapshot>> {
    Ok(Json(state.agents.snapshot(&hostname).await?))
}

async fn request_seed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SeedRequest>,
) -> Result<(StatusCode, Json<SeedResponse>)> {
    let (operation, target_snapshot) = state
        .engine
        .request_seed(&request.target, &request.source)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SeedResponse {
            operation,
            target_snapshot,
        }),
    ))
}

async fn list_seeds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SeedOperation>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.seeds.list_operations(limit).await?))
}

async fn active_seeds(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveSeedInfo>> {
    Json(state.engine.active_seeds().await)
}

async fn get_seed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SeedOperation>> {
    state
        .seeds
        .get_operation(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("seed {id} not found")))
}

async fn seed_steps(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SeedStep>>> {
    if state.seeds.get_operation(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("seed {id} not found")));
    }
    Ok(Json(state.seeds.list_steps(&id).await?))
}
