//! Run report types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::LedgerOutcome;
use crate::tracker::{ApplicationId, ExtractedFact, FieldChanges, NewApplication, NoOpReason};

/// Why an email never reached extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// An earlier run already handled it.
    Ledger,
    /// Relevance rules matched.
    Filter,
}

/// Which step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    Store,
}

/// What happened to one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmailOutcome {
    /// `id` is `None` in dry runs.
    Inserted {
        id: Option<ApplicationId>,
        record: NewApplication,
    },
    Updated {
        id: ApplicationId,
        changes: FieldChanges,
    },
    NoOp {
        reason: NoOpReason,
    },
    Skipped {
        kind: SkipKind,
        reason: String,
    },
    Failed {
        stage: FailureStage,
        error: String,
    },
}

impl EmailOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Updated { .. } => "updated",
            Self::NoOp { .. } => "noop",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    /// How this outcome is remembered; `None` means leave the ledger alone.
    pub fn ledger_outcome(&self) -> Option<LedgerOutcome> {
        match self {
            Self::Inserted { .. } => Some(LedgerOutcome::Inserted),
            Self::Updated { .. } => Some(LedgerOutcome::Updated),
            Self::NoOp { .. } => Some(LedgerOutcome::NoOp),
            Self::Skipped {
                kind: SkipKind::Filter,
                ..
            } => Some(LedgerOutcome::Filtered),
            Self::Skipped {
                kind: SkipKind::Ledger,
                ..
            } => None,
            Self::Failed { .. } => Some(LedgerOutcome::Failed),
        }
    }

    /// Free-form detail for the ledger row.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::NoOp { reason } => Some(reason.to_string()),
            Self::Skipped { reason, .. } => Some(reason.clone()),
            Self::Failed { error, .. } => Some(error.clone()),
            Self::Updated { changes, .. } => Some(changes.to_string()),
            Self::Inserted { .. } => None,
        }
    }
}

/// Per-email entry of a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailReport {
    pub email_id: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    /// Present once extraction succeeded.
    pub fact: Option<ExtractedFact>,
    pub outcome: EmailOutcome,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub inserted: usize,
    pub updated: usize,
    pub noop: usize,
    pub skipped: usize,
    pub failed: usize,
    pub llm_cost: Decimal,
    pub outcomes: Vec<EmailReport>,
    /// Set when the batch stopped early.
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(run_id: Uuid, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            inserted: 0,
            updated: 0,
            noop: 0,
            skipped: 0,
            failed: 0,
            llm_cost: Decimal::ZERO,
            outcomes: Vec::new(),
            aborted: None,
        }
    }

    /// Tally and keep one email's entry.
    pub fn push(&mut self, entry: EmailReport) {
        match entry.outcome {
            EmailOutcome::Inserted { .. } => self.inserted += 1,
            EmailOutcome::Updated { .. } => self.updated += 1,
            EmailOutcome::NoOp { .. } => self.noop += 1,
            EmailOutcome::Skipped { .. } => self.skipped += 1,
            EmailOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(entry);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// One-line totals for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{} email(s): {} inserted, {} updated, {} no-op, {} skipped, {} failed, LLM cost ${}{}",
            self.total(),
            self.inserted,
            self.updated,
            self.noop,
            self.skipped,
            self.failed,
            self.llm_cost.round_dp(4),
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}
