//! Processed-email ledger (libSQL).
//!
//! Remembers which emails earlier runs already handled so a re-run over an
//! overlapping window does not spend extraction calls on them again.
//! Failed emails stay eligible and are retried on the next run.

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database};
use tracing::info;

use crate::error::DatabaseError;
use crate::pipeline::RunReport;
use crate::store::migrations::run_migrations;

/// What happened to an email, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Inserted,
    Updated,
    NoOp,
    /// Dropped by the relevance filter.
    Filtered,
    Failed,
}

impl LedgerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::NoOp => "noop",
            Self::Filtered => "filtered",
            Self::Failed => "failed",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "inserted" => Self::Inserted,
            "updated" => Self::Updated,
            "noop" => Self::NoOp,
            "filtered" => Self::Filtered,
            _ => Self::Failed,
        }
    }

    /// Whether a later run should leave this email alone.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// A row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub email_id: String,
    pub outcome: LedgerOutcome,
    pub subject: String,
    pub detail: Option<String>,
    pub run_id: String,
    pub attempts: i64,
    pub processed_at: DateTime<Utc>,
}

/// libSQL-backed ledger.
pub struct Ledger {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Ledger {
    /// Open (or create) a database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let ledger = Self::from_database(db).await?;
        info!(path = %path.display(), "Ledger opened");
        Ok(ledger)
    }

    /// In-memory database (tests, dry runs without a ledger file).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        run_migrations(&conn).await?;
        Ok(Self { db, conn })
    }

    /// Whether an earlier run reached a terminal outcome for this email.
    pub async fn is_processed(&self, email_id: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .get(email_id)
            .await?
            .is_some_and(|entry| entry.outcome.is_terminal()))
    }

    pub async fn get(&self, email_id: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT email_id, outcome, subject, detail, run_id, attempts, processed_at
                 FROM processed_emails WHERE email_id = ?1",
                libsql::params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read ledger: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read ledger row: {e}")))?
        else {
            return Ok(None);
        };

        row_to_entry(&row)
            .map(Some)
            .map_err(|e| DatabaseError::Query(format!("Failed to parse ledger row: {e}")))
    }

    /// Upsert the outcome for an email. Repeated records bump `attempts`.
    pub async fn record(
        &self,
        email_id: &str,
        subject: &str,
        outcome: LedgerOutcome,
        detail: Option<&str>,
        run_id: &str,
    ) -> Result<(), DatabaseError> {
        let detail = match detail {
            Some(d) => libsql::Value::Text(d.to_string()),
            None => libsql::Value::Null,
        };
        self.conn
            .execute(
                "INSERT INTO processed_emails (email_id, outcome, subject, detail, run_id, attempts, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                 ON CONFLICT(email_id) DO UPDATE SET
                    outcome = excluded.outcome,
                    subject = excluded.subject,
                    detail = excluded.detail,
                    run_id = excluded.run_id,
                    attempts = processed_emails.attempts + 1,
                    processed_at = excluded.processed_at",
                libsql::params![
                    email_id,
                    outcome.as_str(),
                    subject,
                    detail,
                    run_id,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to record {email_id}: {e}")))?;
        Ok(())
    }

    /// Persist a run's totals.
    pub async fn record_run(
        &self,
        report: &RunReport,
        started_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO runs
                    (run_id, started_at, finished_at, dry_run, inserted, updated, noop, skipped, failed, llm_cost)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                libsql::params![
                    report.run_id.to_string(),
                    started_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                    i64::from(report.dry_run),
                    report.inserted as i64,
                    report.updated as i64,
                    report.noop as i64,
                    report.skipped as i64,
                    report.failed as i64,
                    report.llm_cost.to_string()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to record run: {e}")))?;
        Ok(())
    }

    /// Number of emails per outcome label.
    pub async fn outcome_counts(&self) -> Result<Vec<(String, i64)>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT outcome, COUNT(*) FROM processed_emails GROUP BY outcome ORDER BY outcome",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to count outcomes: {e}")))?;

        let mut counts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let label: String = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?;
            counts.push((label, count));
        }
        Ok(counts)
    }
}

#[cfg(test)]
impl Ledger {
    /// Drop the ledger table so every later read or write fails.
    pub(crate) async fn break_schema(&self) {
        self.conn
            .execute("DROP TABLE processed_emails", ())
            .await
            .unwrap();
    }
}

fn row_to_entry(row: &libsql::Row) -> Result<LedgerEntry, libsql::Error> {
    let outcome: String = row.get(1)?;
    let processed_at: String = row.get(6)?;
    Ok(LedgerEntry {
        email_id: row.get(0)?,
        outcome: LedgerOutcome::from_db(&outcome),
        subject: row.get(2)?,
        detail: row.get(3).ok(),
        run_id: row.get(4)?,
        attempts: row.get(5)?,
        processed_at: DateTime::parse_from_rfc3339(&processed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
