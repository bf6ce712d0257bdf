//! Per-operation step log with a single finalisation path.
//!
//! The workflow appends one step per state it enters; appends are
//! best-effort. [`StepLog::finish`] is the only place an outcome is
//! written: it attaches the error to the most recent step (adding one if
//! the workflow never got that far), completes the operation, and logs the
//! result.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::persistence::seed_repo::SeedRepo;
use crate::Result;

use super::SeedState;

#[derive(Debug, Clone)]
struct Cursor {
    state: SeedState,
    step_id: Option<String>,
}

/// Append-only step log bound to one seed operation.
pub struct StepLog {
    repo: SeedRepo,
    seed_id: String,
    cursor: Mutex<Cursor>,
}

impl StepLog {
    /// Create a log for `seed_id` positioned at [`SeedState::Validating`].
    #[must_use]
    pub fn new(repo: SeedRepo, seed_id: String) -> Self {
        Self {
            repo,
            seed_id,
            cursor: Mutex::new(Cursor {
                state: SeedState::Validating,
                step_id: None,
            }),
        }
    }

    /// State of the most recently entered step.
    #[must_use]
    pub fn state(&self) -> SeedState {
        self.lock().state
    }

    /// Append a step describing the action about to be attempted.
    ///
    /// A failed append is logged and otherwise ignored; the previous step
    /// stays current.
    pub async fn enter(&self, state: SeedState, action: impl Into<String>) {
        let action = action.into();
        let appended = self.repo.append_step(&self.seed_id, &action).await;

        let mut cursor = self.lock();
        cursor.state = state;
        match appended {
            Ok(step) => cursor.step_id = Some(step.id),
            Err(err) => {
                warn!(seed_id = %self.seed_id, %err, action, "failed to append seed step");
            }
        }
    }

    /// Record the terminal outcome of the workflow.
    pub async fn finish(&self, outcome: &Result<()>) {
        let Cursor { state, step_id } = self.lock().clone();

        if let Err(reason) = outcome {
            let step_id = match step_id {
                Some(step_id) => Some(step_id),
                None => self
                    .repo
                    .append_step(&self.seed_id, "Seed ended before its first step")
                    .await
                    .map(|step| step.id)
                    .map_err(|err| {
                        warn!(seed_id = %self.seed_id, %err, "failed to append closing seed step");
                    })
                    .ok(),
            };
            if let Some(step_id) = step_id {
                if let Err(err) = self.repo.record_step_error(&step_id, &reason.to_string()).await {
                    error!(seed_id = %self.seed_id, %err, "failed to record seed step error");
                }
            }
        }

        if let Err(err) = self
            .repo
            .complete_operation(&self.seed_id, outcome.is_ok())
            .await
        {
            error!(seed_id = %self.seed_id, %err, "failed to complete seed operation");
        }

        match outcome {
            Ok(()) => info!(seed_id = %self.seed_id, "seed completed"),
            Err(reason) => {
                error!(seed_id = %self.seed_id, ?state, %reason, "seed failed");
            }
        }

        self.lock().state = if outcome.is_ok() {
            SeedState::Completed
        } else {
            SeedState::Failed
        };
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
