//! Subject scan: how many application confirmations arrived over a period.
//!
//! Headers only, no LLM, no store.

use regex::Regex;

use crate::mail::RawEmail;

/// Subject phrases that mark an application confirmation.
pub const CONFIRMATION_PHRASES: &[&str] = &[
    "application received",
    "thank you for applying",
    "your application for",
];

/// Result of scanning a window of mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Subjects that matched, oldest first.
    pub subjects: Vec<String>,
}

/// Case-insensitive alternation of `phrases`.
pub fn confirmation_pattern(phrases: &[&str]) -> Result<Regex, regex::Error> {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}"))
}

pub fn scan(emails: &[RawEmail], pattern: &Regex) -> ScanReport {
    ScanReport {
        subjects: emails
            .iter()
            .filter(|e| pattern.is_match(&e.subject))
            .map(|e| e.subject.clone())
            .collect(),
    }
}
