//! Seed operation and step log repository for `SQLite` persistence.
//!
//! Operations are created once and completed once. Steps are append-only;
//! the only mutation allowed afterwards is attaching an error message to a
//! step that has none yet.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::seed::{SeedOperation, SeedStep};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for seed operations and their steps.
#[derive(Clone)]
pub struct SeedRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SeedOperationRow {
    id: String,
    target_hostname: String,
    source_hostname: String,
    start_timestamp: String,
    end_timestamp: Option<String>,
    is_complete: bool,
    is_successful: bool,
}

impl SeedOperationRow {
    fn into_operation(self) -> Result<SeedOperation> {
        let start_timestamp = parse_timestamp("start_timestamp", &self.start_timestamp)?;
        let end_timestamp = self
            .end_timestamp
            .as_deref()
            .map(|raw| parse_timestamp("end_timestamp", raw))
            .transpose()?;

        Ok(SeedOperation {
            id: self.id,
            target_hostname: self.target_hostname,
            source_hostname: self.source_hostname,
            start_timestamp,
            end_timestamp,
            is_complete: self.is_complete,
            is_successful: self.is_successful,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeedStepRow {
    id: String,
    seed_operation_id: String,
    timestamp: String,
    action: String,
    error_message: String,
}

impl SeedStepRow {
    fn into_step(self) -> Result<SeedStep> {
        Ok(SeedStep {
            timestamp: parse_timestamp("timestamp", &self.timestamp)?,
            id: self.id,
            seed_operation_id: self.seed_operation_id,
            action: self.action,
            error_message: self.error_message,
        })
    }
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

const OPERATION_COLUMNS: &str = "id, target_hostname, source_hostname, start_timestamp, \
     end_timestamp, is_complete, is_successful";

impl SeedRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new, incomplete seed operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create_operation(&self, target: &str, source: &str) -> Result<SeedOperation> {
        let operation = SeedOperation::new(target.to_owned(), source.to_owned());

        sqlx::query(
            "INSERT INTO seed_operation (id, target_hostname, source_hostname, start_timestamp)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&operation.id)
        .bind(&operation.target_hostname)
        .bind(&operation.source_hostname)
        .bind(super::format_timestamp(operation.start_timestamp))
        .execute(self.db.as_ref())
        .await?;

        Ok(operation)
    }

    /// Append a step to an operation's log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn append_step(&self, seed_id: &str, action: &str) -> Result<SeedStep> {
        let step = SeedStep::new(seed_id.to_owned(), action.to_owned());

        sqlx::query(
            "INSERT INTO seed_step (id, seed_operation_id, timestamp, action, error_message)
             VALUES (?1, ?2, ?3, ?4, '')",
        )
        .bind(&step.id)
        .bind(&step.seed_operation_id)
        .bind(super::format_timestamp(step.timestamp))
        .bind(&step.action)
        .execute(self.db.as_ref())
        .await?;

        Ok(step)
    }

    /// Attach an error message to a step. A step that already carries an
    /// error keeps its first one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn record_step_error(&self, step_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE seed_step SET error_message = ?1 WHERE id = ?2 AND error_message = ''")
            .bind(error)
            .bind(step_id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Mark an operation complete with the given outcome and set its end time.
    ///
    /// Repeated calls leave the first outcome in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn complete_operation(&self, seed_id: &str, success: bool) -> Result<()> {
        sqlx::query(
            "UPDATE seed_operation
             SET end_timestamp = ?1, is_complete = 1, is_successful = ?2
             WHERE id = ?3 AND is_complete = 0",
        )
        .bind(super::format_timestamp(Utc::now()))
        .bind(success)
        .bind(seed_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve an operation by its ID.
    ///
    /// Returns `Ok(None)` if the operation does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_operation(&self, seed_id: &str) -> Result<Option<SeedOperation>> {
        let row: Option<SeedOperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM seed_operation WHERE id = ?1"
        ))
        .bind(seed_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SeedOperationRow::into_operation).transpose()
    }

    /// List the most recent operations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_operations(&self, limit: u32) -> Result<Vec<SeedOperation>> {
        let rows: Vec<SeedOperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM seed_operation \
             ORDER BY start_timestamp DESC, rowid DESC LIMIT ?1"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(SeedOperationRow::into_operation)
            .collect()
    }

    /// List operations that have not reached a terminal state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active_operations(&self) -> Result<Vec<SeedOperation>> {
        let rows: Vec<SeedOperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM seed_operation \
             WHERE is_complete = 0 ORDER BY start_timestamp, rowid"
        ))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(SeedOperationRow::into_operation)
            .collect()
    }

    /// List an operation's steps in creation order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_steps(&self, seed_id: &str) -> Result<Vec<SeedStep>> {
        let rows: Vec<SeedStepRow> = sqlx::query_as(
            "SELECT id, seed_operation_id, timestamp, action, error_message \
             FROM seed_step WHERE seed_operation_id = ?1 ORDER BY seq",
        )
        .bind(seed_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(SeedStepRow::into_step).collect()
    }
}
