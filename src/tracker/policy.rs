//! Status-merge policy: which fields a fact may change on an existing row.
//!
//! Rules, in order:
//! 1. An `Applied` fact never touches status (Applied is the floor).
//! 2. Any other known status that differs from the row's is staged, unless
//!    the transition table blocks (current, new).
//! 3. Source is staged only when the row has none yet (first writer wins).
//! 4. Company and role are never staged.
//!
//! The default table allows every transition, including apparent
//! regressions such as Rejected → Interview.

use crate::error::ConfigError;
use crate::tracker::model::{ApplicationStatus, ExtractedFact, FieldChanges, TrackedApplication};

const STATUS_COUNT: usize = ApplicationStatus::ALL.len();

/// Outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Allowed,
    Blocked,
}

/// Directed status transition table keyed by (current, new).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    cells: [[Transition; STATUS_COUNT]; STATUS_COUNT],
}

impl TransitionTable {
    /// Every transition allowed.
    pub fn permissive() -> Self {
        Self {
            cells: [[Transition::Allowed; STATUS_COUNT]; STATUS_COUNT],
        }
    }

    /// Rejected is terminal; an offer does not fall back to earlier stages.
    pub fn strict() -> Self {
        let mut table = Self::permissive();
        for to in ApplicationStatus::ALL {
            table = table.block(ApplicationStatus::Rejected, to);
        }
        table
            .block(ApplicationStatus::Offer, ApplicationStatus::Assessment)
            .block(ApplicationStatus::Offer, ApplicationStatus::Interview)
    }

    /// Block one transition.
    pub fn block(mut self, from: ApplicationStatus, to: ApplicationStatus) -> Self {
        self.cells[from as usize][to as usize] = Transition::Blocked;
        self
    }

    pub fn lookup(&self, from: ApplicationStatus, to: ApplicationStatus) -> Transition {
        self.cells[from as usize][to as usize]
    }

    pub fn allows(&self, from: ApplicationStatus, to: ApplicationStatus) -> bool {
        self.lookup(from, to) == Transition::Allowed
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::permissive()
    }
}

/// Named policy presets, selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    #[default]
    Permissive,
    Strict,
}

impl StatusPolicy {
    pub fn table(&self) -> TransitionTable {
        match self {
            Self::Permissive => TransitionTable::permissive(),
            Self::Strict => TransitionTable::strict(),
        }
    }
}

impl std::str::FromStr for StatusPolicy {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidValue {
                key: "JOB_TRACKER_STATUS_POLICY".into(),
                message: format!("expected 'permissive' or 'strict', got '{other}'"),
            }),
        }
    }
}

/// Compute the changes a fact stages on an existing row, using `table`.
pub fn decide_with(
    table: &TransitionTable,
    existing: &TrackedApplication,
    fact: &ExtractedFact,
) -> FieldChanges {
    let mut changes = FieldChanges::default();

    let new_status = fact.status;
    if new_status != ApplicationStatus::Applied
        && new_status.is_known()
        && new_status != existing.status
        && table.allows(existing.status, new_status)
    {
        changes.status = Some(new_status);
    }

    if !existing.has_source() && fact.source.is_known() {
        changes.source = Some(fact.source);
    }

    changes
}

/// Compute the changes a fact stages on an existing row, permissive table.
pub fn decide(existing: &TrackedApplication, fact: &ExtractedFact) -> FieldChanges {
    decide_with(&TransitionTable::permissive(), existing, fact)
}
