//! Run pipeline.
//!
//! Every run flows through:
//! 1. `TrackingStore::list_all()` → `Snapshot` (once)
//! 2. `EmailSource::fetch_recent()` → emails, oldest first (once)
//! 3. per email: ledger check → `RelevanceRules` → `Extractor` →
//!    `Reconciler` → store write → ledger record
//!
//! The snapshot is not refreshed mid-run unless `apply_in_run` is set.

pub mod orchestrator;
pub mod types;

pub use orchestrator::{RunOptions, RunOrchestrator};
pub use types::{EmailOutcome, EmailReport, FailureStage, RunReport, SkipKind};
