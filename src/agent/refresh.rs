//! Background refresh of the agent registry.
//!
//! On each tick, agents that have not announced themselves for
//! `unseen_forget_hours` are forgotten, then every agent not checked within
//! `poll_minutes` is snapshotted so the registry records when it was last
//! checked, last seen, and how many volumes it offers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::persistence::agent_repo::AgentRepo;
use crate::Result;

use super::AgentClient;

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a single refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Agents deleted for not announcing themselves.
    pub forgotten: u64,
    /// Agents successfully snapshotted.
    pub refreshed: usize,
    /// Agents whose snapshot failed.
    pub failed: usize,
}

/// Spawn the registry refresh background task.
#[must_use]
pub fn spawn_refresh_task(
    agents: Arc<dyn AgentClient>,
    registry: AgentRepo,
    config: AgentConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REFRESH_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("agent refresh task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = refresh_once(agents.as_ref(), &registry, &config).await {
                        error!(%err, "agent refresh failed");
                    }
                }
            }
        }
    })
}

/// Run one forget-then-refresh pass over the registry.
///
/// Individual agent failures are counted, not returned.
///
/// # Errors
///
/// Returns `AppError::Db` if the registry cannot be read or pruned.
pub async fn refresh_once(
    agents: &dyn AgentClient,
    registry: &AgentRepo,
    config: &AgentConfig,
) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary {
        forgotten: registry.forget_unseen(config.unseen_forget_hours).await?,
        ..RefreshSummary::default()
    };

    for hostname in registry.list_outdated_hostnames(config.poll_minutes).await? {
        registry.update_last_checked(&hostname).await?;

        match agents.snapshot(&hostname).await {
            Ok(snapshot) => {
                registry
                    .update_info(&hostname, snapshot.logical_volumes.len())
                    .await?;
                summary.refreshed += 1;
            }
            Err(err) => {
                warn!(hostname, %err, "agent refresh snapshot failed");
                summary.failed += 1;
            }
        }
    }

    if summary != RefreshSummary::default() {
        info!(
            forgotten = summary.forgotten,
            refreshed = summary.refreshed,
            failed = summary.failed,
            "agent registry refreshed"
        );
    }
    Ok(summary)
}
