//! Persistence layer modules.

pub mod agent_repo;
pub mod db;
pub mod schema;
pub mod seed_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp with fixed precision so stored values sort lexically.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
