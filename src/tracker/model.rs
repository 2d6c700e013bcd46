//! Tracker data model: applications, extracted facts and decisions.

use serde::{Deserialize, Serialize};

// ── Status ──────────────────────────────────────────────────────────

/// Pipeline status of an application.
///
/// Variant order follows typical pipeline progression. `Unknown` is the
/// extraction sentinel ("could not determine") and is never written to a
/// new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Applied,
    Assessment,
    Interview,
    Offer,
    Rejected,
    Unknown,
}

impl ApplicationStatus {
    /// All variants, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Applied,
        Self::Assessment,
        Self::Interview,
        Self::Offer,
        Self::Rejected,
        Self::Unknown,
    ];

    /// Parse a free-form label. Total: anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match squash(label).as_str() {
            "applied" => Self::Applied,
            "assessment" => Self::Assessment,
            "interview" => Self::Interview,
            "offer" => Self::Offer,
            "rejected" => Self::Rejected,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::Assessment => "Assessment",
            Self::Interview => "Interview",
            Self::Offer => "Offer",
            Self::Rejected => "Rejected",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_label(s) {
            Self::Unknown if squash(s) != "unknown" => Err(format!("Unknown status: {}", s)),
            status => Ok(status),
        }
    }
}

// ── Source ──────────────────────────────────────────────────────────

/// Where the application was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationSource {
    LinkedIn,
    Indeed,
    Naukri,
    Foundit,
    CompanyWebsite,
    Unknown,
}

impl ApplicationSource {
    /// Parse a free-form label. Total: anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match squash(label).as_str() {
            "linkedin" => Self::LinkedIn,
            "indeed" => Self::Indeed,
            "naukri" => Self::Naukri,
            "foundit" => Self::Foundit,
            "companywebsite" => Self::CompanyWebsite,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedIn => "LinkedIn",
            Self::Indeed => "Indeed",
            Self::Naukri => "Naukri",
            Self::Foundit => "Foundit",
            Self::CompanyWebsite => "Company Website",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

impl std::fmt::Display for ApplicationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case and drop everything but ASCII alphanumerics.
fn squash(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ── Records ─────────────────────────────────────────────────────────

/// Opaque store handle for a tracked application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row in the tracking store, as read at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedApplication {
    pub id: ApplicationId,
    pub company: String,
    pub role: String,
    pub status: ApplicationStatus,
    pub source: ApplicationSource,
    /// Source label the store holds outside the known vocabulary
    /// (e.g. "Referral" typed by hand). Counts as a set source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_source: Option<String>,
}

impl TrackedApplication {
    /// Whether the row already carries a source, known or not.
    pub fn has_source(&self) -> bool {
        self.source.is_known() || self.other_source.is_some()
    }
}

/// Structured facts pulled out of one email. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub company: String,
    pub role: String,
    pub status: ApplicationStatus,
    pub source: ApplicationSource,
}

impl ExtractedFact {
    pub fn new(
        company: impl Into<String>,
        role: impl Into<String>,
        status: ApplicationStatus,
        source: ApplicationSource,
    ) -> Self {
        Self {
            company: company.into(),
            role: role.into(),
            status,
            source,
        }
    }
}

/// A row to be created in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    /// Company as written in the email (trimmed).
    pub company: String,
    /// Role as written in the email (trimmed).
    pub role: String,
    pub status: ApplicationStatus,
    pub source: ApplicationSource,
}

/// Fields staged for change on an existing row.
///
/// Only `status` and `source` can ever change; company and role are fixed
/// once a row exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ApplicationSource>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.source.is_none()
    }
}

impl std::fmt::Display for FieldChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status -> {status}"));
        }
        if let Some(source) = self.source {
            parts.push(format!("source -> {source}"));
        }
        if parts.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

// ── Decisions ───────────────────────────────────────────────────────

/// Why a fact produced no store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// Company or role missing after normalization.
    IncompleteFact,
    /// The matching row already reflects everything the fact says.
    AlreadyCurrent,
}

impl std::fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompleteFact => write!(f, "incomplete fact"),
            Self::AlreadyCurrent => write!(f, "already current"),
        }
    }
}

/// Reconciliation outcome for one fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReconciliationDecision {
    Insert(NewApplication),
    Update {
        id: ApplicationId,
        changes: FieldChanges,
    },
    NoOp {
        reason: NoOpReason,
    },
}

impl ReconciliationDecision {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update { .. } => "update",
            Self::NoOp { .. } => "noop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_parse_leniently() {
        assert_eq!(ApplicationStatus::from_label("Interview"), ApplicationStatus::Interview);
        assert_eq!(ApplicationStatus::from_label("  rejected "), ApplicationStatus::Rejected);
        assert_eq!(ApplicationStatus::from_label("OFFER"), ApplicationStatus::Offer);
        assert_eq!(ApplicationStatus::from_label("N/A"), ApplicationStatus::Unknown);
        assert_eq!(ApplicationStatus::from_label("ghosted"), ApplicationStatus::Unknown);
        assert_eq!(ApplicationStatus::from_label(""), ApplicationStatus::Unknown);
    }

    #[test]
    fn status_from_str_rejects_garbage() {
        assert_eq!("Applied".parse::<ApplicationStatus>(), Ok(ApplicationStatus::Applied));
        assert_eq!("unknown".parse::<ApplicationStatus>(), Ok(ApplicationStatus::Unknown));
        assert!("pending".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn status_order_follows_pipeline() {
        assert!(ApplicationStatus::Applied < ApplicationStatus::Assessment);
        assert!(ApplicationStatus::Interview < ApplicationStatus::Offer);
        assert!(ApplicationStatus::Offer < ApplicationStatus::Rejected);
    }

    #[test]
    fn source_labels_parse_leniently() {
        assert_eq!(ApplicationSource::from_label("LinkedIn"), ApplicationSource::LinkedIn);
        assert_eq!(ApplicationSource::from_label("linkedin"), ApplicationSource::LinkedIn);
        assert_eq!(
            ApplicationSource::from_label("Company Website"),
            ApplicationSource::CompanyWebsite
        );
        assert_eq!(
            ApplicationSource::from_label("company_website"),
            ApplicationSource::CompanyWebsite
        );
        assert_eq!(ApplicationSource::from_label("N/A"), ApplicationSource::Unknown);
        assert_eq!(ApplicationSource::from_label("Monster"), ApplicationSource::Unknown);
    }

    #[test]
    fn source_display_uses_store_label() {
        assert_eq!(ApplicationSource::CompanyWebsite.to_string(), "Company Website");
        assert_eq!(ApplicationSource::from_label(ApplicationSource::CompanyWebsite.as_str()), ApplicationSource::CompanyWebsite);
    }

    #[test]
    fn field_changes_empty_and_display() {
        let none = FieldChanges::default();
        assert!(none.is_empty());
        assert_eq!(none.to_string(), "(none)");

        let both = FieldChanges {
            status: Some(ApplicationStatus::Interview),
            source: Some(ApplicationSource::LinkedIn),
        };
        assert!(!both.is_empty());
        assert_eq!(both.to_string(), "status -> Interview, source -> LinkedIn");
    }

    #[test]
    fn decision_labels() {
        let insert = ReconciliationDecision::Insert(NewApplication {
            company: "Acme".into(),
            role: "Engineer".into(),
            status: ApplicationStatus::Applied,
            source: ApplicationSource::Unknown,
        });
        assert_eq!(insert.label(), "insert");

        let noop = ReconciliationDecision::NoOp {
            reason: NoOpReason::AlreadyCurrent,
        };
        assert_eq!(noop.label(), "noop");
    }

    #[test]
    fn decision_serialization_is_tagged() {
        let update = ReconciliationDecision::Update {
            id: ApplicationId::new("page-1"),
            changes: FieldChanges {
                status: Some(ApplicationStatus::Offer),
                source: None,
            },
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["decision"], "update");
        assert_eq!(json["changes"]["status"], "Offer");
        assert!(json["changes"].get("source").is_none());
    }

    #[test]
    fn noop_reason_display() {
        assert_eq!(NoOpReason::IncompleteFact.to_string(), "incomplete fact");
        assert_eq!(NoOpReason::AlreadyCurrent.to_string(), "already current");
    }
}
