//! Fact normalization: canonical company/role text.
//!
//! Pure and total. Status and source are typed, so the "coerce anything
//! unrecognised to `Unknown`" half of normalization already happened when
//! the labels were parsed (`ApplicationStatus::from_label`).

use crate::tracker::model::ExtractedFact;

/// Placeholder the extractor emits when it could not find a field.
pub const NOT_AVAILABLE: &str = "n/a";

/// Canonical form of a company or role: trimmed, lower-cased.
pub fn canonical(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Whether canonical text carries no information.
pub fn is_placeholder(canonical_text: &str) -> bool {
    canonical_text.is_empty() || canonical_text == NOT_AVAILABLE
}

/// Normalize an extracted fact.
pub fn normalize(fact: &ExtractedFact) -> ExtractedFact {
    ExtractedFact {
        company: canonical(&fact.company),
        role: canonical(&fact.role),
        status: fact.status,
        source: fact.source,
    }
}

/// Whether a normalized fact names both a company and a role.
pub fn is_complete(normalized: &ExtractedFact) -> bool {
    !is_placeholder(&normalized.company) && !is_placeholder(&normalized.role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::model::{ApplicationSource, ApplicationStatus};

    fn fact(company: &str, role: &str) -> ExtractedFact {
        ExtractedFact::new(
            company,
            role,
            ApplicationStatus::Interview,
            ApplicationSource::LinkedIn,
        )
    }

    #[test]
    fn lowercases_and_trims() {
        let n = normalize(&fact("  Acme Corp ", "Senior ENGINEER\n"));
        assert_eq!(n.company, "acme corp");
        assert_eq!(n.role, "senior engineer");
        assert_eq!(n.status, ApplicationStatus::Interview);
        assert_eq!(n.source, ApplicationSource::LinkedIn);
    }

    #[test]
    fn idempotent() {
        let inputs = [
            fact("Acme", "Engineer"),
            fact("  ÉCOLE Numérique ", " Data Scientist "),
            fact("N/A", ""),
            fact("", "   "),
            fact("already lower", "already lower"),
        ];
        for input in &inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {:?}", input);
        }
    }

    #[test]
    fn inner_whitespace_kept() {
        let n = normalize(&fact("Acme  Corp", "Engineer"));
        assert_eq!(n.company, "acme  corp");
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("n/a"));
        assert!(!is_placeholder("na"));
        assert!(!is_placeholder("acme"));
    }

    #[test]
    fn completeness() {
        assert!(is_complete(&normalize(&fact("Acme", "Engineer"))));
        assert!(!is_complete(&normalize(&fact("N/A", "Engineer"))));
        assert!(!is_complete(&normalize(&fact("Acme", " n/a "))));
        assert!(!is_complete(&normalize(&fact("   ", "Engineer"))));
    }
}
