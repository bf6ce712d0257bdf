//! Copy progress polling with stall detection.
//!
//! The target's MySQL disk usage is polled on a fixed interval. The first
//! poll only establishes a reading; every later poll that sees the same
//! value as the one before it counts as stale, and any change resets the
//! count. The copy is complete once the target holds at least as many
//! bytes as the mounted source volume, and stalled once the stale count
//! reaches the configured limit.

use std::time::Duration;

use crate::agent::AgentClient;
use crate::{AppError, Result};

use super::step_log::StepLog;
use super::SeedState;

/// Verdict after observing one progress reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Target holds at least the expected number of bytes.
    Complete,
    /// Copy is still running.
    Copying,
    /// Too many consecutive readings without change.
    Stalled,
}

/// Pure bookkeeping for progress readings.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    expected_bytes: i64,
    max_stale_polls: u32,
    last: Option<i64>,
    stale_polls: u32,
}

impl ProgressTracker {
    /// Track a copy of `expected_bytes`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` if `expected_bytes` is not positive,
    /// since no percentage can be computed against it.
    pub fn new(expected_bytes: i64, max_stale_polls: u32) -> Result<Self> {
        if expected_bytes <= 0 {
            return Err(AppError::Precondition(format!(
                "source data volume reports {expected_bytes} bytes; nothing to copy"
            )));
        }
        Ok(Self {
            expected_bytes,
            max_stale_polls,
            last: None,
            stale_polls: 0,
        })
    }

    /// Fold in one reading of bytes copied so far.
    pub fn observe(&mut self, copied: i64) -> Progress {
        if let Some(previous) = self.last {
            if previous == copied {
                self.stale_polls += 1;
            } else {
                self.stale_polls = 0;
            }
        }
        self.last = Some(copied);

        if copied >= self.expected_bytes {
            Progress::Complete
        } else if self.stale_polls >= self.max_stale_polls {
            Progress::Stalled
        } else {
            Progress::Copying
        }
    }

    /// Integer percentage of `copied` relative to the expected size.
    #[must_use]
    pub fn percent(&self, copied: i64) -> i64 {
        let pct = i128::from(copied) * 100 / i128::from(self.expected_bytes);
        i64::try_from(pct).unwrap_or(i64::MAX)
    }

    /// Consecutive unchanged readings so far.
    #[must_use]
    pub fn stale_polls(&self) -> u32 {
        self.stale_polls
    }

    /// Bytes the target must reach.
    #[must_use]
    pub fn expected_bytes(&self) -> i64 {
        self.expected_bytes
    }
}

/// Polls a target agent until its copy completes or stalls.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMonitor {
    poll_interval: Duration,
    max_stale_polls: u32,
}

impl ProgressMonitor {
    /// Construct a monitor.
    #[must_use]
    pub fn new(poll_interval: Duration, max_stale_polls: u32) -> Self {
        Self {
            poll_interval,
            max_stale_polls,
        }
    }

    /// Poll `target` until it holds `expected_bytes`, appending one step
    /// per reading. Returns the final byte count.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` for a non-positive `expected_bytes`,
    /// `AppError::TransferStalled` when the stale limit is hit, or the
    /// agent client's error if a poll cannot fetch the target.
    pub async fn watch(
        &self,
        agents: &dyn AgentClient,
        log: &StepLog,
        target: &str,
        expected_bytes: i64,
    ) -> Result<i64> {
        let mut tracker = ProgressTracker::new(expected_bytes, self.max_stale_polls)?;

        loop {
            let copied = agents.snapshot(target).await?.mysql_disk_usage;
            let progress = tracker.observe(copied);

            log.enter(
                SeedState::Polling,
                format!(
                    "Copied {copied}/{} bytes ({}%)",
                    tracker.expected_bytes(),
                    tracker.percent(copied)
                ),
            )
            .await;

            match progress {
                Progress::Complete => return Ok(copied),
                Progress::Stalled => {
                    return Err(AppError::TransferStalled(format!(
                        "{} polls passed without progress on {target}; bailing out",
                        tracker.stale_polls()
                    )));
                }
                Progress::Copying => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}
