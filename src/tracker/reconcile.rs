//! Insert-vs-update decision for one extracted fact.

use tracing::debug;

use crate::tracker::model::{
    ApplicationStatus, ExtractedFact, NewApplication, NoOpReason, ReconciliationDecision,
};
use crate::tracker::normalize::{is_complete, normalize};
use crate::tracker::policy::{TransitionTable, decide_with};
use crate::tracker::snapshot::Snapshot;

/// Pure reconciliation engine. Holds only its policy; no I/O, no state.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    table: TransitionTable,
}

impl Reconciler {
    pub fn new(table: TransitionTable) -> Self {
        Self { table }
    }

    /// Decide what a fact means against the snapshot.
    ///
    /// Accepts raw or normalized facts; matching always uses the canonical
    /// form. Inserted rows keep the email's own casing (trimmed).
    pub fn reconcile(&self, snapshot: &Snapshot, fact: &ExtractedFact) -> ReconciliationDecision {
        let normalized = normalize(fact);
        if !is_complete(&normalized) {
            return ReconciliationDecision::NoOp {
                reason: NoOpReason::IncompleteFact,
            };
        }

        let Some(existing) = snapshot.lookup(&normalized) else {
            let status = if normalized.status.is_known() {
                normalized.status
            } else {
                ApplicationStatus::Applied
            };
            return ReconciliationDecision::Insert(NewApplication {
                company: fact.company.trim().to_string(),
                role: fact.role.trim().to_string(),
                status,
                source: normalized.source,
            });
        };

        let changes = decide_with(&self.table, existing, &normalized);
        if changes.is_empty() {
            debug!(id = %existing.id, "Fact matches current row");
            ReconciliationDecision::NoOp {
                reason: NoOpReason::AlreadyCurrent,
            }
        } else {
            ReconciliationDecision::Update {
                id: existing.id.clone(),
                changes,
            }
        }
    }
}

/// Reconcile with the default (permissive) policy.
pub fn reconcile(snapshot: &Snapshot, fact: &ExtractedFact) -> ReconciliationDecision {
    Reconciler::default().reconcile(snapshot, fact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::model::{
        ApplicationId, ApplicationSource, FieldChanges, TrackedApplication,
    };

    fn row(status: ApplicationStatus, source: ApplicationSource) -> TrackedApplication {
        TrackedApplication {
            id: ApplicationId::new("page-acme"),
            company: "acme".into(),
            role: "engineer".into(),
            status,
            source,
            other_source: None,
        }
    }

    fn acme(status: ApplicationStatus, source: ApplicationSource) -> ExtractedFact {
        ExtractedFact::new("Acme", "Engineer", status, source)
    }

    // ── Scenarios ───────────────────────────────────────────────────

    #[test]
    fn empty_snapshot_inserts() {
        let decision = reconcile(
            &Snapshot::default(),
            &acme(ApplicationStatus::Applied, ApplicationSource::LinkedIn),
        );
        match decision {
            ReconciliationDecision::Insert(record) => {
                assert_eq!(record.status, ApplicationStatus::Applied);
                assert_eq!(record.source, ApplicationSource::LinkedIn);
                assert_eq!(record.company, "Acme");
                assert_eq!(record.role, "Engineer");
            }
            other => panic!("Expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn interview_with_source_updates_both() {
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Applied,
            ApplicationSource::Unknown,
        )]);
        let decision = reconcile(
            &snapshot,
            &acme(ApplicationStatus::Interview, ApplicationSource::LinkedIn),
        );
        assert_eq!(
            decision,
            ReconciliationDecision::Update {
                id: ApplicationId::new("page-acme"),
                changes: FieldChanges {
                    status: Some(ApplicationStatus::Interview),
                    source: Some(ApplicationSource::LinkedIn),
                },
            }
        );
    }

    #[test]
    fn applied_after_interview_is_noop() {
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Interview,
            ApplicationSource::LinkedIn,
        )]);
        let decision = reconcile(
            &snapshot,
            &acme(ApplicationStatus::Applied, ApplicationSource::Indeed),
        );
        assert_eq!(
            decision,
            ReconciliationDecision::NoOp {
                reason: NoOpReason::AlreadyCurrent
            }
        );
    }

    #[test]
    fn rejected_can_move_back_to_interview() {
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Rejected,
            ApplicationSource::LinkedIn,
        )]);
        let decision = reconcile(
            &snapshot,
            &acme(ApplicationStatus::Interview, ApplicationSource::Unknown),
        );
        assert_eq!(
            decision,
            ReconciliationDecision::Update {
                id: ApplicationId::new("page-acme"),
                changes: FieldChanges {
                    status: Some(ApplicationStatus::Interview),
                    source: None,
                },
            }
        );
    }

    #[test]
    fn missing_company_is_incomplete_regardless_of_snapshot() {
        let snapshots = [
            Snapshot::default(),
            Snapshot::new(vec![TrackedApplication {
                id: ApplicationId::new("page-na"),
                company: "n/a".into(),
                role: "engineer".into(),
                status: ApplicationStatus::Applied,
                source: ApplicationSource::Unknown,
                other_source: None,
            }]),
        ];
        let fact = ExtractedFact::new(
            "N/A",
            "Engineer",
            ApplicationStatus::Interview,
            ApplicationSource::LinkedIn,
        );
        for snapshot in &snapshots {
            assert_eq!(
                reconcile(snapshot, &fact),
                ReconciliationDecision::NoOp {
                    reason: NoOpReason::IncompleteFact
                }
            );
        }
    }

    #[test]
    fn two_facts_same_run_both_see_pre_run_snapshot() {
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Applied,
            ApplicationSource::Unknown,
        )]);
        let older = acme(ApplicationStatus::Assessment, ApplicationSource::Indeed);
        let newer = acme(ApplicationStatus::Interview, ApplicationSource::LinkedIn);

        let first = reconcile(&snapshot, &older);
        let second = reconcile(&snapshot, &newer);

        assert_eq!(
            first,
            ReconciliationDecision::Update {
                id: ApplicationId::new("page-acme"),
                changes: FieldChanges {
                    status: Some(ApplicationStatus::Assessment),
                    source: Some(ApplicationSource::Indeed),
                },
            }
        );
        // Computed against the pre-run row, not merged with the first.
        assert_eq!(
            second,
            ReconciliationDecision::Update {
                id: ApplicationId::new("page-acme"),
                changes: FieldChanges {
                    status: Some(ApplicationStatus::Interview),
                    source: Some(ApplicationSource::LinkedIn),
                },
            }
        );
    }

    // ── Properties ──────────────────────────────────────────────────

    #[test]
    fn empty_role_never_inserts() {
        for role in ["", "   ", "N/A", "n/a", " N/a "] {
            let fact = ExtractedFact::new(
                "Acme",
                role,
                ApplicationStatus::Applied,
                ApplicationSource::LinkedIn,
            );
            let decision = reconcile(&Snapshot::default(), &fact);
            assert!(
                !matches!(decision, ReconciliationDecision::Insert(_)),
                "role {role:?} inserted"
            );
        }
    }

    #[test]
    fn unknown_status_inserts_as_applied() {
        let decision = reconcile(
            &Snapshot::default(),
            &acme(ApplicationStatus::Unknown, ApplicationSource::Unknown),
        );
        match decision {
            ReconciliationDecision::Insert(record) => {
                assert_eq!(record.status, ApplicationStatus::Applied);
                assert_eq!(record.source, ApplicationSource::Unknown);
            }
            other => panic!("Expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn advanced_status_inserted_as_is() {
        let decision = reconcile(
            &Snapshot::default(),
            &acme(ApplicationStatus::Rejected, ApplicationSource::Foundit),
        );
        assert!(matches!(
            decision,
            ReconciliationDecision::Insert(NewApplication {
                status: ApplicationStatus::Rejected,
                ..
            })
        ));
    }

    #[test]
    fn insert_keeps_display_casing_trimmed() {
        let fact = ExtractedFact::new(
            "  Globex Corporation ",
            " Staff SRE",
            ApplicationStatus::Applied,
            ApplicationSource::CompanyWebsite,
        );
        match reconcile(&Snapshot::default(), &fact) {
            ReconciliationDecision::Insert(record) => {
                assert_eq!(record.company, "Globex Corporation");
                assert_eq!(record.role, "Staff SRE");
            }
            other => panic!("Expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn rerun_yields_same_decision() {
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Assessment,
            ApplicationSource::Unknown,
        )]);
        let facts = [
            acme(ApplicationStatus::Offer, ApplicationSource::Naukri),
            acme(ApplicationStatus::Applied, ApplicationSource::Unknown),
            ExtractedFact::new(
                "Initech",
                "Tester",
                ApplicationStatus::Applied,
                ApplicationSource::Indeed,
            ),
            ExtractedFact::new("", "", ApplicationStatus::Unknown, ApplicationSource::Unknown),
        ];
        for fact in &facts {
            assert_eq!(reconcile(&snapshot, fact), reconcile(&snapshot, fact));
        }
    }

    #[test]
    fn normalized_and_raw_facts_agree() {
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Applied,
            ApplicationSource::Unknown,
        )]);
        let raw = ExtractedFact::new(
            " ACME ",
            "Engineer ",
            ApplicationStatus::Offer,
            ApplicationSource::Indeed,
        );
        assert_eq!(
            reconcile(&snapshot, &raw),
            reconcile(&snapshot, &normalize(&raw))
        );
    }

    #[test]
    fn strict_reconciler_keeps_rejected() {
        let reconciler = Reconciler::new(TransitionTable::strict());
        let snapshot = Snapshot::new(vec![row(
            ApplicationStatus::Rejected,
            ApplicationSource::LinkedIn,
        )]);
        let decision = reconciler.reconcile(
            &snapshot,
            &acme(ApplicationStatus::Interview, ApplicationSource::Unknown),
        );
        assert_eq!(
            decision,
            ReconciliationDecision::NoOp {
                reason: NoOpReason::AlreadyCurrent
            }
        );
    }

    #[test]
    fn duplicate_rows_update_first() {
        let mut second = row(ApplicationStatus::Applied, ApplicationSource::Unknown);
        second.id = ApplicationId::new("page-dup");
        let snapshot = Snapshot::new(vec![
            row(ApplicationStatus::Applied, ApplicationSource::Unknown),
            second,
        ]);
        match reconcile(
            &snapshot,
            &acme(ApplicationStatus::Offer, ApplicationSource::Unknown),
        ) {
            ReconciliationDecision::Update { id, .. } => {
                assert_eq!(id, ApplicationId::new("page-acme"));
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }
}
