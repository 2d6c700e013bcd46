//! In-memory tracking store.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::TrackingStore;
use crate::tracker::{ApplicationId, FieldChanges, NewApplication, TrackedApplication};

/// Rows held in a `Vec`, ids assigned as `mem-<n>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<TrackedApplication>>,
}

impl MemoryStore {
    pub fn new(rows: Vec<TrackedApplication>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Copy of the current rows.
    pub fn rows(&self) -> Vec<TrackedApplication> {
        self.rows.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_all(&self) -> Result<Vec<TrackedApplication>, StoreError> {
        Ok(self.rows())
    }

    async fn insert(&self, record: &NewApplication) -> Result<ApplicationId, StoreError> {
        let mut rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        let id = ApplicationId::new(format!("mem-{}", rows.len() + 1));
        rows.push(TrackedApplication {
            id: id.clone(),
            company: record.company.clone(),
            role: record.role.clone(),
            status: record.status,
            source: record.source,
            other_source: None,
        });
        Ok(id)
    }

    async fn update(&self, id: &ApplicationId, changes: &FieldChanges) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap_or_else(|p| p.into_inner());
        let row = rows
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StoreError::Write {
                target: id.to_string(),
                reason: "no such row".into(),
            })?;
        if let Some(status) = changes.status {
            row.status = status;
        }
        if let Some(source) = changes.source {
            row.source = source;
        }
        Ok(())
    }
}
