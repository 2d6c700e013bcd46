//! Version-tracked migrations for the processed-email ledger.
//!
//! Steps are numbered; only those above the recorded version are applied.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append new steps at the end; never edit an applied one.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "processed_emails",
        sql: r#"
            CREATE TABLE IF NOT EXISTS processed_emails (
                email_id TEXT PRIMARY KEY,
                outcome TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                detail TEXT,
                run_id TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 1,
                processed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_processed_emails_outcome ON processed_emails(outcome);
        "#,
    },
    Migration {
        version: 2,
        name: "run_history",
        sql: r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                dry_run INTEGER NOT NULL DEFAULT 0,
                inserted INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                noop INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                llm_cost TEXT NOT NULL DEFAULT '0'
            );
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
        "#,
    },
];

/// Bring the ledger schema up to the latest version.
///
/// Each pending step runs in its own transaction together with its
/// `schema_versions` row, so a failed step leaves the previous version intact.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create schema_versions: {e}")))?;

    let applied = applied_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Ledger schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Migrating ledger");
        let failed = |e: libsql::Error| {
            DatabaseError::Migration(format!("V{} {}: {e}", step.version, step.name))
        };

        let tx = conn.transaction().await.map_err(failed)?;
        tx.execute_batch(step.sql).await.map_err(failed)?;
        tx.execute(
            "INSERT INTO schema_versions (version, name) VALUES (?1, ?2)",
            libsql::params![step.version, step.name],
        )
        .await
        .map_err(failed)?;
        tx.commit().await.map_err(failed)?;
    }
    Ok(())
}

/// Highest applied version; 0 on a fresh database.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let read_failed =
        |e: libsql::Error| DatabaseError::Migration(format!("Failed to read schema version: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_versions", ())
        .await
        .map_err(read_failed)?;
    match rows.next().await.map_err(read_failed)? {
        Some(row) => row.get::<i64>(0).map_err(read_failed),
        None => Ok(0),
    }
}
