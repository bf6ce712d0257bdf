//! Seed workflow engine.
//!
//! [`SeedEngine::request_seed`] persists a new operation and launches its
//! workflow as a supervised background task. Each workflow walks the
//! [`SeedState`] sequence once; the first failing step ends it. The
//! supervisor owns finalisation, so a workflow that returns an error,
//! panics, or is aborted is always recorded as failed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, info_span, warn, Instrument};

use crate::agent::AgentClient;
use crate::config::SeedConfig;
use crate::models::agent::{AgentCommand, AgentSnapshot};
use crate::models::seed::SeedOperation;
use crate::persistence::seed_repo::SeedRepo;
use crate::{AppError, Result};

use super::progress_monitor::ProgressMonitor;
use super::step_log::StepLog;
use super::SeedState;

/// Timing knobs for the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedTiming {
    /// Pause between starting the receiver and starting the sender.
    pub listen_grace: Duration,
    /// Interval between progress polls.
    pub poll_interval: Duration,
    /// Consecutive unchanged polls tolerated before failing.
    pub max_stale_polls: u32,
}

impl From<&SeedConfig> for SeedTiming {
    fn from(config: &SeedConfig) -> Self {
        Self {
            listen_grace: Duration::from_secs(config.listen_grace_seconds),
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_stale_polls: config.max_stale_polls,
        }
    }
}

impl Default for SeedTiming {
    fn default() -> Self {
        Self::from(&SeedConfig::default())
    }
}

/// A running seed as reported by [`SeedEngine::active_seeds`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveSeedInfo {
    /// Operation record as created.
    pub operation: SeedOperation,
    /// State of the most recently entered step.
    pub state: SeedState,
}

struct ActiveSeed {
    operation: SeedOperation,
    log: Arc<StepLog>,
    workflow: AbortHandle,
    supervisor: Option<JoinHandle<()>>,
}

/// Running seeds keyed by operation id. Once `closed` is set no new seed
/// is admitted.
#[derive(Default)]
struct Registry {
    closed: bool,
    seeds: HashMap<String, ActiveSeed>,
}

type ActiveSeeds = Arc<Mutex<Registry>>;

/// Drives seed workflows and tracks the ones still running.
#[derive(Clone)]
pub struct SeedEngine {
    agents: Arc<dyn AgentClient>,
    repo: SeedRepo,
    timing: SeedTiming,
    active: ActiveSeeds,
}

impl SeedEngine {
    /// Construct an engine.
    #[must_use]
    pub fn new(agents: Arc<dyn AgentClient>, repo: SeedRepo, timing: SeedTiming) -> Self {
        Self {
            agents,
            repo,
            timing,
            active: ActiveSeeds::default(),
        }
    }

    /// Start seeding `target` from `source`.
    ///
    /// The workflow runs in the background; this returns once the operation
    /// is persisted and a fresh snapshot of the target has been read. The
    /// snapshot is taken after the workflow is scheduled, so a failure here
    /// leaves the workflow running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` if the hosts are equal, either is
    /// already part of a running seed, or the engine is shutting down, `AppError::Db` if the operation
    /// cannot be persisted, or the agent client's error if the target
    /// snapshot fails.
    pub async fn request_seed(
        &self,
        target: &str,
        source: &str,
    ) -> Result<(SeedOperation, AgentSnapshot)> {
        if target == source {
            return Err(AppError::InvalidRequest(format!(
                "cannot seed {target} onto itself"
            )));
        }

        let operation = {
            let mut active = self.active.lock().await;
            if active.closed {
                return Err(AppError::InvalidRequest(
                    "coordinator is shutting down; no new seeds are accepted".into(),
                ));
            }
            if let Some(busy) = active
                .seeds
                .values()
                .find(|seed| seed.operation.involves(target) || seed.operation.involves(source))
            {
                return Err(AppError::InvalidRequest(format!(
                    "seed {} between {} and {} is still running",
                    busy.operation.id,
                    busy.operation.source_hostname,
                    busy.operation.target_hostname
                )));
            }

            let operation = self.repo.create_operation(target, source).await?;
            info!(seed_id = %operation.id, target, source, "seed requested");
            let seed = self.launch(operation.clone());
            active.seeds.insert(operation.id.clone(), seed);
            operation
        };

        let snapshot = self.agents.snapshot(target).await?;
        Ok((operation, snapshot))
    }

    /// Seeds whose workflow has not finished yet.
    pub async fn active_seeds(&self) -> Vec<ActiveSeedInfo> {
        let active = self.active.lock().await;
        let mut seeds: Vec<ActiveSeedInfo> = active
            .seeds
            .values()
            .map(|seed| ActiveSeedInfo {
                operation: seed.operation.clone(),
                state: seed.log.state(),
            })
            .filter(|info| !info.state.is_terminal())
            .collect();
        seeds.sort_by(|a, b| a.operation.start_timestamp.cmp(&b.operation.start_timestamp));
        seeds
    }

    /// Wait until the workflow for `seed_id` has been finalised.
    ///
    /// Returns immediately if the seed is not running. Only one caller can
    /// wait on a given seed; later callers return immediately.
    pub async fn join(&self, seed_id: &str) {
        let supervisor = self
            .active
            .lock()
            .await
            .seeds
            .get_mut(seed_id)
            .and_then(|seed| seed.supervisor.take());

        if let Some(handle) = supervisor {
            if let Err(err) = handle.await {
                warn!(seed_id, %err, "seed supervisor ended abnormally");
            }
        }
    }

    /// Stop admitting seeds, abort every running workflow, and wait for each
    /// to be recorded as failed.
    pub async fn shutdown(&self) {
        let supervisors: Vec<JoinHandle<()>> = {
            let mut active = self.active.lock().await;
            active.closed = true;
            active
                .seeds
                .values_mut()
                .filter_map(|seed| {
                    seed.workflow.abort();
                    seed.supervisor.take()
                })
                .collect()
        };

        info!(count = supervisors.len(), "aborting running seeds");
        for handle in supervisors {
            if let Err(err) = handle.await {
                warn!(%err, "seed supervisor ended abnormally");
            }
        }
    }

    /// Mark operations left incomplete by an earlier process as failed.
    ///
    /// Seeds running in this engine are left alone. Returns the number of
    /// operations closed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if incomplete operations cannot be listed.
    pub async fn fail_interrupted(&self) -> Result<usize> {
        let running: HashSet<String> = self.active.lock().await.seeds.keys().cloned().collect();
        let orphaned: Vec<SeedOperation> = self
            .repo
            .list_active_operations()
            .await?
            .into_iter()
            .filter(|operation| !running.contains(&operation.id))
            .collect();

        for operation in &orphaned {
            let log = StepLog::new(self.repo.clone(), operation.id.clone());
            log.enter(
                SeedState::Failed,
                "Closing seed left unfinished by a previous run",
            )
            .await;
            log.finish(&Err(AppError::Internal(
                "coordinator restarted before the seed finished".into(),
            )))
            .await;
        }

        Ok(orphaned.len())
    }

    fn launch(&self, operation: SeedOperation) -> ActiveSeed {
        let span = info_span!(
            "seed",
            seed_id = %operation.id,
            target = %operation.target_hostname,
            source = %operation.source_hostname
        );
        let log = Arc::new(StepLog::new(self.repo.clone(), operation.id.clone()));

        let workflow = tokio::spawn(
            run_workflow(
                Arc::clone(&self.agents),
                Arc::clone(&log),
                self.timing,
                operation.target_hostname.clone(),
                operation.source_hostname.clone(),
            )
            .instrument(span.clone()),
        );
        let abort = workflow.abort_handle();

        let active = Arc::clone(&self.active);
        let seed_id = operation.id.clone();
        let supervisor_log = Arc::clone(&log);
        let supervisor = tokio::spawn(
            async move {
                let outcome = match workflow.await {
                    Ok(outcome) => outcome,
                    Err(err) if err.is_cancelled() => {
                        Err(AppError::Internal("seed workflow aborted".into()))
                    }
                    Err(err) => Err(AppError::Internal(format!("seed workflow panicked: {err}"))),
                };
                supervisor_log.finish(&outcome).await;
                active.lock().await.seeds.remove(&seed_id);
            }
            .instrument(span),
        );

        ActiveSeed {
            operation,
            log,
            workflow: abort,
            supervisor: Some(supervisor),
        }
    }
}

/// The seed state machine. Each state appends its step before acting.
async fn run_workflow(
    agents: Arc<dyn AgentClient>,
    log: Arc<StepLog>,
    timing: SeedTiming,
    target: String,
    source: String,
) -> Result<()> {
    log.enter(
        SeedState::Validating,
        format!("Getting agent info for target {target} and source {source}"),
    )
    .await;
    let target_agent = agents.snapshot(&target).await?;
    let source_agent = agents.snapshot(&source).await?;

    log.enter(
        SeedState::PrecheckTarget,
        format!("Checking MySQL status on target {target}"),
    )
    .await;
    if target_agent.mysql_running {
        return Err(AppError::Precondition(format!(
            "MySQL is running on target host {target}; refusing to proceed, please stop the MySQL service"
        )));
    }

    log.enter(
        SeedState::PrecheckSource,
        format!("Looking up logical volumes and mount point on source {source}"),
    )
    .await;
    let Some(volume) = source_agent.logical_volumes.first().cloned() else {
        return Err(AppError::Precondition(format!(
            "no logical volumes found on source host {source}"
        )));
    };
    if source_agent.mount_point.is_mounted {
        return Err(AppError::Precondition(format!(
            "volume already mounted on source host {source}; please unmount"
        )));
    }

    log.enter(
        SeedState::Mounting,
        format!("Mounting logical volume {} on {source}", volume.path),
    )
    .await;
    agents
        .run_command(&source, &AgentCommand::MountLogicalVolume(volume.path.clone()))
        .await?;
    let expected_bytes = agents.snapshot(&source).await?.mount_point.mysql_disk_usage;
    if expected_bytes <= 0 {
        return Err(AppError::Precondition(format!(
            "MySQL data volume on source host {source} is {expected_bytes} bytes; nothing to copy"
        )));
    }

    log.enter(
        SeedState::Erasing,
        format!("Erasing MySQL data on {target}"),
    )
    .await;
    agents
        .run_command(&target, &AgentCommand::DeleteDatadir)
        .await?;

    log.enter(
        SeedState::Transferring,
        format!(
            "Sending {expected_bytes} bytes from {source} to {target} after a {}s listen grace",
            timing.listen_grace.as_secs()
        ),
    )
    .await;
    start_transfer(agents.as_ref(), &target, &source, timing.listen_grace).await;

    log.enter(
        SeedState::Polling,
        format!("Polling {target} until {expected_bytes} bytes are copied"),
    )
    .await;
    ProgressMonitor::new(timing.poll_interval, timing.max_stale_polls)
        .watch(agents.as_ref(), &log, &target, expected_bytes)
        .await?;

    log.enter(
        SeedState::Unmounting,
        format!("Unmounting logical volume {} on {source}", volume.path),
    )
    .await;
    agents.run_command(&source, &AgentCommand::Unmount).await?;

    log.enter(
        SeedState::Starting,
        format!("Starting MySQL on target {target}"),
    )
    .await;
    agents
        .run_command(&target, &AgentCommand::StartMysql)
        .await?;

    Ok(())
}

/// Start the receiver on `target`, give it `grace` to listen, then start the
/// sender on `source`. Neither command's result decides the outcome; the
/// progress monitor does.
async fn start_transfer(agents: &dyn AgentClient, target: &str, source: &str, grace: Duration) {
    if let Err(err) = agents
        .run_command(target, &AgentCommand::ReceiveSeedData)
        .await
    {
        warn!(%err, "receive command failed; progress polling will decide");
    }

    tokio::time::sleep(grace).await;

    if let Err(err) = agents
        .run_command(source, &AgentCommand::SendSeedData(target.to_owned()))
        .await
    {
        warn!(%err, "send command failed; progress polling will decide");
    }
}
