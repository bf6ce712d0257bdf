//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so the
//! bootstrap runs on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS host_agent (
    hostname              TEXT PRIMARY KEY NOT NULL,
    port                  INTEGER NOT NULL,
    token                 TEXT NOT NULL,
    last_submitted        TEXT NOT NULL,
    last_checked          TEXT,
    last_seen             TEXT,
    count_mysql_snapshots INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS seed_operation (
    id                TEXT PRIMARY KEY NOT NULL,
    target_hostname   TEXT NOT NULL,
    source_hostname   TEXT NOT NULL,
    start_timestamp   TEXT NOT NULL,
    end_timestamp     TEXT,
    is_complete       INTEGER NOT NULL DEFAULT 0,
    is_successful     INTEGER NOT NULL DEFAULT 0,
    CHECK (target_hostname <> source_hostname)
);

CREATE TABLE IF NOT EXISTS seed_step (
    seq               INTEGER PRIMARY KEY AUTOINCREMENT,
    id                TEXT NOT NULL UNIQUE,
    seed_operation_id TEXT NOT NULL REFERENCES seed_operation(id) ON DELETE CASCADE,
    timestamp         TEXT NOT NULL,
    action            TEXT NOT NULL,
    error_message     TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_seed_operation_target ON seed_operation(target_hostname);
CREATE INDEX IF NOT EXISTS idx_seed_operation_source ON seed_operation(source_hostname);
CREATE INDEX IF NOT EXISTS idx_seed_step_operation ON seed_step(seed_operation_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
