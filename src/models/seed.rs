//! Seed operation and step log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One seeding attempt from a source host onto a target host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SeedOperation {
    /// Unique record identifier.
    pub id: String,
    /// Host receiving the data; its data directory is erased.
    pub target_hostname: String,
    /// Host the data is cloned from.
    pub source_hostname: String,
    /// Time the request was accepted.
    pub start_timestamp: DateTime<Utc>,
    /// Time the workflow reached a terminal state.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Whether the workflow has finished, successfully or not.
    pub is_complete: bool,
    /// Outcome; only meaningful once `is_complete` is set.
    pub is_successful: bool,
}

impl SeedOperation {
    /// Construct a new, incomplete operation with a generated identifier.
    #[must_use]
    pub fn new(target_hostname: String, source_hostname: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target_hostname,
            source_hostname,
            start_timestamp: Utc::now(),
            end_timestamp: None,
            is_complete: false,
            is_successful: false,
        }
    }

    /// Whether this operation reads from or writes to `hostname`.
    #[must_use]
    pub fn involves(&self, hostname: &str) -> bool {
        self.target_hostname == hostname || self.source_hostname == hostname
    }
}

/// Append-only log entry describing one step of a seed workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SeedStep {
    /// Unique record identifier.
    pub id: String,
    /// Owning operation.
    pub seed_operation_id: String,
    /// Time the step was entered.
    pub timestamp: DateTime<Utc>,
    /// Human-readable description of the attempted action.
    pub action: String,
    /// Failure reason; empty unless this step failed.
    pub error_message: String,
}

impl SeedStep {
    /// Construct a new step with no error attached.
    #[must_use]
    pub fn new(seed_operation_id: String, action: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seed_operation_id,
            timestamp: Utc::now(),
            action,
            error_message: String::new(),
        }
    }
}
