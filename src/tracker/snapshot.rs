//! Store snapshot, the run's immutable view of tracked applications.
//!
//! Built once per run from `TrackingStore::list_all()`. Keeps the rows in
//! store order and a first-occurrence index on the canonical
//! (company, role) key so lookups agree with a linear scan.

use std::collections::HashMap;

use tracing::debug;

use crate::tracker::model::{
    ApplicationId, ApplicationStatus, ExtractedFact, FieldChanges, NewApplication,
    TrackedApplication,
};
use crate::tracker::normalize::canonical;

/// Canonical natural key of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub company: String,
    pub role: String,
}

impl MatchKey {
    pub fn new(company: &str, role: &str) -> Self {
        Self {
            company: canonical(company),
            role: canonical(role),
        }
    }

    pub fn of_application(app: &TrackedApplication) -> Self {
        Self::new(&app.company, &app.role)
    }

    pub fn of_fact(fact: &ExtractedFact) -> Self {
        Self::new(&fact.company, &fact.role)
    }
}

/// First entry whose canonical (company, role) equals the fact's.
///
/// Plain linear scan in snapshot order; exact equality, no fuzzy matching.
pub fn find_match<'a>(
    entries: &'a [TrackedApplication],
    fact: &ExtractedFact,
) -> Option<&'a ApplicationId> {
    let key = MatchKey::of_fact(fact);
    entries
        .iter()
        .find(|app| MatchKey::of_application(app) == key)
        .map(|app| &app.id)
}

/// Immutable-per-run view of the tracking store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<TrackedApplication>,
    /// Key → position of the first entry with that key.
    index: HashMap<MatchKey, usize>,
}

impl Snapshot {
    pub fn new(entries: Vec<TrackedApplication>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, app) in entries.iter().enumerate() {
            index.entry(MatchKey::of_application(app)).or_insert(pos);
        }
        let snapshot = Self { entries, index };
        let shadowed = snapshot.shadowed_count();
        if shadowed > 0 {
            debug!(shadowed, "Snapshot contains duplicate company/role rows");
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matching row for a fact, via the first-occurrence index.
    pub fn lookup(&self, fact: &ExtractedFact) -> Option<&TrackedApplication> {
        self.index
            .get(&MatchKey::of_fact(fact))
            .map(|&pos| &self.entries[pos])
    }

    /// Rows hidden behind an earlier row with the same key.
    pub fn shadowed_count(&self) -> usize {
        self.entries.len() - self.index.len()
    }

    /// Fold an applied insert into the snapshot.
    ///
    /// Only used when the orchestrator runs with in-run refresh enabled.
    pub fn record_insert(&mut self, id: ApplicationId, record: &NewApplication) {
        let app = TrackedApplication {
            id,
            company: record.company.clone(),
            role: record.role.clone(),
            status: record.status,
            source: record.source,
            other_source: None,
        };
        let pos = self.entries.len();
        self.index.entry(MatchKey::of_application(&app)).or_insert(pos);
        self.entries.push(app);
    }

    /// Fold an applied update into the snapshot. Returns false if the id is
    /// not present.
    pub fn record_update(&mut self, id: &ApplicationId, changes: &FieldChanges) -> bool {
        let Some(app) = self.entries.iter_mut().find(|app| &app.id == id) else {
            return false;
        };
        if let Some(status) = changes.status {
            app.status = status;
        }
        if let Some(source) = changes.source {
            app.source = source;
        }
        true
    }

    /// Count of rows per status, in pipeline order. Unparseable rows count
    /// under `Unknown`.
    pub fn status_counts(&self) -> Vec<(ApplicationStatus, usize)> {
        ApplicationStatus::ALL
            .iter()
            .map(|status| {
                let n = self.entries.iter().filter(|a| a.status == *status).count();
                (*status, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Rows whose source is still unset.
    pub fn missing_source_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|a| !a.has_source())
            .count()
    }
}

impl From<Vec<TrackedApplication>> for Snapshot {
    fn from(entries: Vec<TrackedApplication>) -> Self {
        Self::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::model::ApplicationSource;

    fn app(id: &str, company: &str, role: &str, status: ApplicationStatus) -> TrackedApplication {
        TrackedApplication {
            id: ApplicationId::new(id),
            company: company.into(),
            role: role.into(),
            status,
            source: ApplicationSource::Unknown,
            other_source: None,
        }
    }

    fn fact(company: &str, role: &str) -> ExtractedFact {
        ExtractedFact::new(
            company,
            role,
            ApplicationStatus::Interview,
            ApplicationSource::Unknown,
        )
    }

    fn sample() -> Vec<TrackedApplication> {
        vec![
            app("p1", "acme", "engineer", ApplicationStatus::Applied),
            app("p2", "Globex", "Analyst", ApplicationStatus::Interview),
            app("p3", "acme", "engineer", ApplicationStatus::Offer),
            app("p4", "acme", "designer", ApplicationStatus::Applied),
        ]
    }

    #[test]
    fn find_match_is_case_insensitive() {
        let entries = sample();
        let id = find_match(&entries, &fact("  GLOBEX ", "analyst"));
        assert_eq!(id, Some(&ApplicationId::new("p2")));
    }

    #[test]
    fn find_match_picks_first_duplicate() {
        let entries = sample();
        assert_eq!(
            find_match(&entries, &fact("Acme", "Engineer")),
            Some(&ApplicationId::new("p1"))
        );
    }

    #[test]
    fn find_match_requires_both_fields() {
        let entries = sample();
        assert_eq!(find_match(&entries, &fact("Acme", "Analyst")), None);
        assert_eq!(find_match(&entries, &fact("Initech", "Engineer")), None);
    }

    #[test]
    fn find_match_no_fuzzy_matching() {
        let entries = sample();
        assert_eq!(find_match(&entries, &fact("Acme Inc", "Engineer")), None);
        assert_eq!(find_match(&entries, &fact("Acme", "Engineers")), None);
    }

    #[test]
    fn find_match_deterministic() {
        let entries = sample();
        let f = fact("acme", "engineer");
        let first = find_match(&entries, &f).cloned();
        for _ in 0..10 {
            assert_eq!(find_match(&entries, &f).cloned(), first);
        }
    }

    #[test]
    fn find_match_empty_snapshot() {
        assert_eq!(find_match(&[], &fact("Acme", "Engineer")), None);
    }

    #[test]
    fn index_agrees_with_linear_scan() {
        let entries = sample();
        let snapshot = Snapshot::new(entries.clone());
        let queries = [
            fact("acme", "engineer"),
            fact("ACME", "Designer"),
            fact("globex", "analyst"),
            fact("nobody", "nothing"),
        ];
        for query in &queries {
            let scanned = find_match(&entries, query);
            let indexed = snapshot.lookup(query).map(|a| &a.id);
            assert_eq!(scanned, indexed, "disagreement for {:?}", query);
        }
    }

    #[test]
    fn shadowed_rows_counted() {
        let snapshot = Snapshot::new(sample());
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.shadowed_count(), 1);
    }

    #[test]
    fn record_insert_becomes_visible() {
        let mut snapshot = Snapshot::new(sample());
        let record = NewApplication {
            company: "Initech".into(),
            role: "Tester".into(),
            status: ApplicationStatus::Applied,
            source: ApplicationSource::Indeed,
        };
        snapshot.record_insert(ApplicationId::new("p9"), &record);
        let found = snapshot.lookup(&fact("initech", "tester")).unwrap();
        assert_eq!(found.id, ApplicationId::new("p9"));
        assert_eq!(found.source, ApplicationSource::Indeed);
    }

    #[test]
    fn record_insert_does_not_shadow_existing() {
        let mut snapshot = Snapshot::new(sample());
        let record = NewApplication {
            company: "Acme".into(),
            role: "Engineer".into(),
            status: ApplicationStatus::Applied,
            source: ApplicationSource::Unknown,
        };
        snapshot.record_insert(ApplicationId::new("p9"), &record);
        assert_eq!(
            snapshot.lookup(&fact("acme", "engineer")).unwrap().id,
            ApplicationId::new("p1")
        );
    }

    #[test]
    fn record_update_changes_fields() {
        let mut snapshot = Snapshot::new(sample());
        let changes = FieldChanges {
            status: Some(ApplicationStatus::Rejected),
            source: Some(ApplicationSource::Naukri),
        };
        assert!(snapshot.record_update(&ApplicationId::new("p2"), &changes));
        let updated = snapshot.lookup(&fact("globex", "analyst")).unwrap();
        assert_eq!(updated.status, ApplicationStatus::Rejected);
        assert_eq!(updated.source, ApplicationSource::Naukri);

        assert!(!snapshot.record_update(&ApplicationId::new("missing"), &changes));
    }

    #[test]
    fn status_counts_in_pipeline_order() {
        let snapshot = Snapshot::new(sample());
        assert_eq!(
            snapshot.status_counts(),
            vec![
                (ApplicationStatus::Applied, 2),
                (ApplicationStatus::Interview, 1),
                (ApplicationStatus::Offer, 1),
            ]
        );
        assert_eq!(snapshot.missing_source_count(), 4);

        let mut rows = sample();
        rows[0].other_source = Some("Referral".into());
        rows[1].source = ApplicationSource::LinkedIn;
        assert_eq!(Snapshot::new(rows).missing_source_count(), 2);
    }
}
