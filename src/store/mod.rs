//! Persistence layer.
//!
//! - `TrackingStore`: the external table of tracked applications (Notion)
//! - `Ledger`: local libSQL record of which emails were already handled

pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod notion;

pub use ledger::{Ledger, LedgerEntry, LedgerOutcome};
pub use memory::MemoryStore;
pub use notion::{NotionConfig, NotionStore};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::tracker::{ApplicationId, FieldChanges, NewApplication, TrackedApplication};

/// The external tracking table.
///
/// Rows are never deleted, and only status and source are ever updated.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    fn name(&self) -> &str;

    /// Every row, in store order.
    async fn list_all(&self) -> Result<Vec<TrackedApplication>, StoreError>;

    /// Create a row; returns the store's handle for it.
    async fn insert(&self, record: &NewApplication) -> Result<ApplicationId, StoreError>;

    /// Write the staged fields of an existing row.
    async fn update(&self, id: &ApplicationId, changes: &FieldChanges) -> Result<(), StoreError>;
}
