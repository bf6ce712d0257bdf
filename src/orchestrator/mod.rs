//! Seed orchestration.
//!
//! Covers the seed workflow state machine, its supervised background
//! tasks, the per-operation step log, and copy progress monitoring.

pub mod progress_monitor;
pub mod seed_engine;
pub mod step_log;

use serde::Serialize;

/// Workflow states, in the order a seed passes through them.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeedState {
    /// Fetching fresh snapshots of both hosts.
    Validating,
    /// Refusing to overwrite a running database.
    PrecheckTarget,
    /// Requiring a volume to clone and a free mount point.
    PrecheckSource,
    /// Mounting the source volume and reading its size.
    Mounting,
    /// Deleting the target's data directory.
    Erasing,
    /// Starting the receiver on the target and the sender on the source.
    Transferring,
    /// Waiting for the target to hold all bytes.
    Polling,
    /// Releasing the source mount.
    Unmounting,
    /// Starting MySQL on the target.
    Starting,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl SeedState {
    /// Whether the workflow ends in this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
