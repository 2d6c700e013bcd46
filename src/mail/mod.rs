//! Email intake.
//!
//! - `EmailSource`: the seam the pipeline reads emails through
//! - `imap`: IMAP-over-TLS implementation (read-only)
//! - `filter`: cheap regex rules that drop obvious non-updates before the LLM
//! - `scan`: confirmation-subject counting over a longer period
//! - `text`: body cleanup helpers

pub mod filter;
pub mod imap;
pub mod scan;
pub mod text;

pub use filter::{RelevanceRules, SkipReason};
pub use imap::{ImapSource, MailConfig};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// One email as handed to extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEmail {
    /// Message-ID header, or a mailbox-local fallback.
    pub id: String,
    pub subject: String,
    pub sender: String,
    /// Plain-text body, quoted replies removed.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl RawEmail {
    /// Text handed to the extractor: subject line, blank line, body.
    pub fn extraction_text(&self) -> String {
        format!("Subject: {}\n\n{}", self.subject, self.body)
    }
}

/// Source of recent candidate emails.
#[async_trait]
pub trait EmailSource: Send + Sync {
    fn name(&self) -> &str;

    /// Emails received within `window` of now, oldest first.
    async fn fetch_recent(&self, window: Duration) -> Result<Vec<RawEmail>, ChannelError>;
}

/// Sort oldest first; ties keep mailbox order.
pub fn sort_oldest_first(emails: &mut [RawEmail]) {
    emails.sort_by_key(|e| e.received_at);
}
