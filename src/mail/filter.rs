//! Pre-LLM relevance rules.
//!
//! Drops emails that match the subject search but are obviously not
//! application updates (job-alert digests, newsletters, bounces), so no
//! extraction call is spent on them. Keep patterns win over skip rules.

use regex::Regex;
use tracing::debug;

use crate::mail::RawEmail;

/// Which email field a rule matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    Sender,
    Subject,
    Body,
}

/// A single skip rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct SkipRule {
    pub regex: Regex,
    pub field: RuleField,
    /// Why this rule triggers.
    pub reason: String,
}

/// Why an email was not sent to extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason(pub String);

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relevance filter.
#[derive(Debug, Clone)]
pub struct RelevanceRules {
    skip_rules: Vec<SkipRule>,
    /// Subjects that always go to extraction.
    keep_patterns: Vec<Regex>,
}

impl RelevanceRules {
    /// Default skip rules and keep patterns.
    pub fn default_rules() -> Self {
        let mut rules = Self::empty();
        let skip = [
            (
                r"(?i)\b(job alerts?|jobs? (for|matching) you|recommended jobs|new jobs|jobs you may be interested in|is hiring)\b",
                RuleField::Subject,
                "job alert digest",
            ),
            (
                r"(?i)\bunsubscribe\b",
                RuleField::Subject,
                "newsletter (unsubscribe in subject)",
            ),
            (
                r"(?i)^(mailer[\-_]?daemon|postmaster)@",
                RuleField::Sender,
                "automated mail system",
            ),
            (
                r"(?i)@(marketing|newsletter|promo|campaign)\b",
                RuleField::Sender,
                "marketing sender",
            ),
            (
                r"(?i)\b(webinar|career fair|hiring event|salary guide)\b",
                RuleField::Subject,
                "recruiting marketing",
            ),
        ];
        for (pattern, field, reason) in skip {
            // Static patterns; covered by tests.
            if let Ok(regex) = Regex::new(pattern) {
                rules.skip_rules.push(SkipRule {
                    regex,
                    field,
                    reason: reason.into(),
                });
            }
        }

        if let Ok(keep) = Regex::new(
            r"(?i)(your application|thank you for applying|thanks for applying|application (received|status|update)|interview|assessment|offer letter)",
        ) {
            rules.keep_patterns.push(keep);
        }
        rules
    }

    /// No rules; every email is relevant.
    pub fn empty() -> Self {
        Self {
            skip_rules: Vec::new(),
            keep_patterns: Vec::new(),
        }
    }

    /// Add a custom skip rule.
    pub fn add_skip_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.skip_rules.push(SkipRule {
            regex: Regex::new(pattern)?,
            field,
            reason: reason.into(),
        });
        Ok(())
    }

    /// Add a subject pattern that bypasses skip rules.
    pub fn add_keep_pattern(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.keep_patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    /// `Some(reason)` if the email should not be extracted.
    pub fn evaluate(&self, email: &RawEmail) -> Option<SkipReason> {
        if self.keep_patterns.iter().any(|r| r.is_match(&email.subject)) {
            return None;
        }

        for rule in &self.skip_rules {
            let value = match rule.field {
                RuleField::Sender => &email.sender,
                RuleField::Subject => &email.subject,
                RuleField::Body => &email.body,
            };
            if rule.regex.is_match(value) {
                debug!(
                    email_id = %email.id,
                    subject = %email.subject,
                    reason = %rule.reason,
                    "Relevance rule matched"
                );
                return Some(SkipReason(rule.reason.clone()));
            }
        }
        None
    }
}

impl Default for RelevanceRules {
    fn default() -> Self {
        Self::default_rules()
    }
}
