//! Agent registry repository for `SQLite` persistence.
//!
//! Agents announce themselves with a hostname, port, and capability token.
//! The token is only ever handed out through [`AgentRepo::lookup_endpoint`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::agent::{Agent, AgentEndpoint};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for registered host agents.
#[derive(Clone)]
pub struct AgentRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    hostname: String,
    port: i64,
    last_submitted: String,
    last_checked: Option<String>,
    last_seen: Option<String>,
    count_mysql_snapshots: i64,
}

impl AgentRow {
    fn into_agent(self) -> Result<Agent> {
        Ok(Agent {
            port: parse_port(self.port)?,
            last_submitted: parse_timestamp("last_submitted", &self.last_submitted)?,
            last_checked: self
                .last_checked
                .as_deref()
                .map(|raw| parse_timestamp("last_checked", raw))
                .transpose()?,
            last_seen: self
                .last_seen
                .as_deref()
                .map(|raw| parse_timestamp("last_seen", raw))
                .transpose()?,
            hostname: self.hostname,
            count_mysql_snapshots: self.count_mysql_snapshots,
        })
    }
}

fn parse_port(raw: i64) -> Result<u16> {
    u16::try_from(raw).map_err(|_| AppError::Db(format!("invalid agent port: {raw}")))
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl AgentRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register an agent, or refresh its port, token, and submission time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn submit(&self, hostname: &str, port: u16, token: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO host_agent (hostname, port, token, last_submitted)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(hostname) DO UPDATE SET
                port = excluded.port,
                token = excluded.token,
                last_submitted = excluded.last_submitted",
        )
        .bind(hostname)
        .bind(i64::from(port))
        .bind(token)
        .bind(super::format_timestamp(Utc::now()))
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve a registered agent without its token.
    ///
    /// Returns `Ok(None)` if the hostname is not registered.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, hostname: &str) -> Result<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT hostname, port, last_submitted, last_checked, last_seen, count_mysql_snapshots
             FROM host_agent WHERE hostname = ?1",
        )
        .bind(hostname)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(AgentRow::into_agent).transpose()
    }

    /// Resolve the address and capability token for a hostname.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownAgent` if the hostname is not registered or
    /// has an empty token, or `AppError::Db` if the query fails.
    pub async fn lookup_endpoint(&self, hostname: &str) -> Result<AgentEndpoint> {
        let row: Option<(String, i64, String)> =
            sqlx::query_as("SELECT hostname, port, token FROM host_agent WHERE hostname = ?1")
                .bind(hostname)
                .fetch_optional(self.db.as_ref())
                .await?;

        match row {
            Some((hostname, port, token)) if !token.is_empty() => Ok(AgentEndpoint {
                hostname,
                port: parse_port(port)?,
                token,
            }),
            _ => Err(AppError::UnknownAgent(format!(
                "cannot get agent/token: {hostname}"
            ))),
        }
    }

    /// List all registered agents ordered by hostname.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            "SELECT hostname, port, last_submitted, last_checked, last_seen, count_mysql_snapshots
             FROM host_agent ORDER BY hostname",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(AgentRow::into_agent).collect()
    }

    /// Hostnames whose last refresh is older than `poll_minutes`, or that
    /// were never refreshed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_outdated_hostnames(&self, poll_minutes: u32) -> Result<Vec<String>> {
        let cutoff = Utc::now() - Duration::minutes(i64::from(poll_minutes));

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT hostname FROM host_agent
             WHERE last_checked IS NULL OR last_checked < ?1
             ORDER BY hostname",
        )
        .bind(super::format_timestamp(cutoff))
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(rows.into_iter().map(|(hostname,)| hostname).collect())
    }

    /// Record that a refresh of `hostname` was attempted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_last_checked(&self, hostname: &str) -> Result<()> {
        sqlx::query("UPDATE host_agent SET last_checked = ?1 WHERE hostname = ?2")
            .bind(super::format_timestamp(Utc::now()))
            .bind(hostname)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Record a successful refresh along with the host's volume count.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_info(&self, hostname: &str, logical_volume_count: usize) -> Result<()> {
        let count = i64::try_from(logical_volume_count).unwrap_or(i64::MAX);

        sqlx::query(
            "UPDATE host_agent SET last_seen = ?1, count_mysql_snapshots = ?2 WHERE hostname = ?3",
        )
        .bind(super::format_timestamp(Utc::now()))
        .bind(count)
        .bind(hostname)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Volume counts for the given hostnames. Unregistered hosts are absent
    /// from the result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a query fails.
    pub async fn count_snapshots(&self, hostnames: &[String]) -> Result<Vec<(String, i64)>> {
        let mut counts = Vec::with_capacity(hostnames.len());
        for hostname in hostnames {
            let row: Option<(String, i64)> = sqlx::query_as(
                "SELECT hostname, count_mysql_snapshots FROM host_agent WHERE hostname = ?1",
            )
            .bind(hostname)
            .fetch_optional(self.db.as_ref())
            .await?;
            counts.extend(row);
        }
        counts.sort();
        Ok(counts)
    }

    /// Delete agents that have not announced themselves for `hours`.
    ///
    /// Returns the number of agents removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn forget_unseen(&self, hours: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));

        let result = sqlx::query("DELETE FROM host_agent WHERE last_submitted < ?1")
            .bind(super::format_timestamp(cutoff))
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
