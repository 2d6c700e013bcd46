//! Extraction prompt and response parsing.

use serde::Deserialize;

use crate::error::ExtractionError;
use crate::mail::text::truncate_chars;
use crate::tracker::{ApplicationSource, ApplicationStatus, ExtractedFact};

/// Emails longer than this are cut before prompting.
pub const MAX_EMAIL_CHARS: usize = 8000;

pub const SYSTEM_PROMPT: &str = "\
You extract job application facts from emails. Reply with a single JSON \
object and nothing else.";

/// Instructions plus the (truncated) email.
pub fn build_prompt(email_text: &str) -> String {
    format!(
        r#"Analyze the following email and extract four pieces of information: Company Name, Job Title, Application Status, and Application Source.

1. **Status**: Must be one of these keywords: 'Applied', 'Interview', 'Assessment', 'Offer', 'Rejected'.
   - If the email is a simple confirmation, status is 'Applied'.
   - If it mentions a test or coding challenge, use 'Assessment'.
   - If it mentions a call or meeting with a person, use 'Interview'.
   - If it says they are not moving forward or the position is filled, use 'Rejected'.

2. **Source**: Must be one of these keywords: 'LinkedIn', 'Indeed', 'Naukri', 'Foundit', 'Company Website'.
   - Determine the source from the email content. If it's not a known job board, assume it's 'Company Website'.

Format the output as a clean JSON object with four keys: "company", "role", "status", and "source".
If any information cannot be found, use the string "N/A".

Email content snippet:
---
{}
---"#,
        truncate_chars(email_text, MAX_EMAIL_CHARS)
    )
}

/// The JSON shape the model must return. All four keys, all strings.
#[derive(Debug, Deserialize)]
struct RawFact {
    company: String,
    role: String,
    status: String,
    source: String,
}

/// Parse a model reply into a fact.
///
/// Labels outside the vocabulary (including "N/A") become `Unknown`;
/// a reply that is not the expected object is an error.
pub fn parse_fact(raw: &str) -> Result<ExtractedFact, ExtractionError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ExtractionError::Malformed(format!("no JSON object in reply: {}", preview(raw))))?;
    let fact: RawFact =
        serde_json::from_str(json).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    Ok(ExtractedFact::new(
        fact.company,
        fact.role,
        ApplicationStatus::from_label(&fact.status),
        ApplicationSource::from_label(&fact.source),
    ))
}

/// Pull a JSON object out of a reply that may be wrapped in a code fence
/// or surrounded by prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

fn preview(text: &str) -> &str {
    truncate_chars(text.trim(), 80)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_email_and_vocabulary() {
        let prompt = build_prompt("Subject: Thanks for applying\n\nHi there");
        assert!(prompt.contains("Thanks for applying"));
        assert!(prompt.contains("'Applied', 'Interview', 'Assessment', 'Offer', 'Rejected'"));
        assert!(prompt.contains("'Company Website'"));
    }

    #[test]
    fn prompt_truncates_long_email() {
        let long = "x".repeat(MAX_EMAIL_CHARS + 500);
        let prompt = build_prompt(&long);
        assert!(prompt.contains(&"x".repeat(MAX_EMAIL_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_EMAIL_CHARS + 1)));
    }

    #[test]
    fn parses_plain_object() {
        let fact = parse_fact(
            r#"{"company": "Acme", "role": "Engineer", "status": "Interview", "source": "LinkedIn"}"#,
        )
        .unwrap();
        assert_eq!(fact.company, "Acme");
        assert_eq!(fact.role, "Engineer");
        assert_eq!(fact.status, ApplicationStatus::Interview);
        assert_eq!(fact.source, ApplicationSource::LinkedIn);
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "```json\n{\"company\": \"Acme\", \"role\": \"Engineer\", \"status\": \"Rejected\", \"source\": \"Company Website\"}\n```";
        let fact = parse_fact(raw).unwrap();
        assert_eq!(fact.status, ApplicationStatus::Rejected);
        assert_eq!(fact.source, ApplicationSource::CompanyWebsite);
    }

    #[test]
    fn parses_object_inside_prose() {
        let raw = "Here you go: {\"company\": \"A\", \"role\": \"B\", \"status\": \"Offer\", \"source\": \"Naukri\"} hope it helps";
        let fact = parse_fact(raw).unwrap();
        assert_eq!(fact.status, ApplicationStatus::Offer);
        assert_eq!(fact.source, ApplicationSource::Naukri);
    }

    #[test]
    fn not_available_and_unknown_labels_become_unknown() {
        let fact = parse_fact(
            r#"{"company": "N/A", "role": "N/A", "status": "Ghosted", "source": "N/A"}"#,
        )
        .unwrap();
        assert_eq!(fact.company, "N/A");
        assert_eq!(fact.status, ApplicationStatus::Unknown);
        assert_eq!(fact.source, ApplicationSource::Unknown);
    }

    #[test]
    fn missing_key_is_malformed() {
        let err = parse_fact(r#"{"company": "Acme", "role": "Engineer", "status": "Applied"}"#)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[test]
    fn non_string_field_is_malformed() {
        let err = parse_fact(
            r#"{"company": "Acme", "role": ["a", "b"], "status": "Applied", "source": "Indeed"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[test]
    fn reply_without_object_is_malformed() {
        assert!(matches!(
            parse_fact("I could not find anything."),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(parse_fact(""), Err(ExtractionError::Malformed(_))));
    }

    #[test]
    fn json_object_extraction_variants() {
        assert_eq!(extract_json_object(" {\"a\":1} "), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("```\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
