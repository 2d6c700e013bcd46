//! Reconciliation engine.
//!
//! Turns one extracted fact plus the run's store snapshot into an insert,
//! an update of status/source, or a no-op. Pure: no I/O, no clocks, no
//! shared state, so re-running on the same inputs gives the same answer.

pub mod model;
pub mod normalize;
pub mod policy;
pub mod reconcile;
pub mod snapshot;

pub use model::{
    ApplicationId, ApplicationSource, ApplicationStatus, ExtractedFact, FieldChanges,
    NewApplication, NoOpReason, ReconciliationDecision, TrackedApplication,
};
pub use normalize::normalize;
pub use policy::{StatusPolicy, TransitionTable, decide};
pub use reconcile::{Reconciler, reconcile};
pub use snapshot::{Snapshot, find_match};
