//! IMAP email source.
//!
//! Raw IMAP over rustls, blocking, run inside `spawn_blocking`. The
//! mailbox is opened with EXAMINE so nothing is ever marked seen or
//! moved; bodies are fetched with `BODY.PEEK[]`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::{env_opt, env_parse, env_required};
use crate::error::{ChannelError, ConfigError};
use crate::mail::text::{strip_html, strip_quoted_text};
use crate::mail::{EmailSource, RawEmail, sort_oldest_first};

/// Subject terms that make an email a candidate application update.
pub const DEFAULT_SUBJECT_TERMS: &[&str] = &[
    "application",
    "interview",
    "assessment",
    "update on your application",
    "your application",
];

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Mailbox connection settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// OR-ed SUBJECT terms; empty means every message in the window.
    pub subject_terms: Vec<String>,
}

impl MailConfig {
    /// Build from `EMAIL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            imap_host: env_opt("EMAIL_IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".into()),
            imap_port: env_parse("EMAIL_IMAP_PORT", 993)?,
            username: env_required("EMAIL_USERNAME")?,
            password: SecretString::from(env_required("EMAIL_PASSWORD")?),
            mailbox: env_opt("EMAIL_MAILBOX").unwrap_or_else(|| "INBOX".into()),
            subject_terms: DEFAULT_SUBJECT_TERMS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Same mailbox, different subject filter.
    pub fn with_subject_terms(mut self, terms: Vec<String>) -> Self {
        self.subject_terms = terms;
        self
    }
}

/// What to fetch per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPart {
    Full,
    HeadersOnly,
}

impl FetchPart {
    fn item(&self) -> &'static str {
        match self {
            Self::Full => "BODY.PEEK[]",
            Self::HeadersOnly => "BODY.PEEK[HEADER]",
        }
    }
}

/// Read-only IMAP mailbox.
pub struct ImapSource {
    config: MailConfig,
}

impl ImapSource {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Headers of every message in the window matching the subject terms.
    /// Bodies are left empty. Used by `scan`.
    pub async fn fetch_headers(&self, window: Duration) -> Result<Vec<RawEmail>, ChannelError> {
        self.fetch(window, FetchPart::HeadersOnly).await
    }

    async fn fetch(&self, window: Duration, part: FetchPart) -> Result<Vec<RawEmail>, ChannelError> {
        let cfg = self.config.clone();
        let cutoff = cutoff(Utc::now(), window)?;

        let emails = tokio::task::spawn_blocking(move || fetch_blocking(&cfg, cutoff, part))
            .await
            .map_err(|e| ChannelError::Task(e.to_string()))??;

        Ok(within_window(emails, cutoff))
    }
}

/// IMAP `SINCE` matches whole days, so the search returns mail from earlier
/// on the cutoff day too. Drop it and order what is left oldest first.
fn within_window(mut emails: Vec<RawEmail>, cutoff: DateTime<Utc>) -> Vec<RawEmail> {
    emails.retain(|e| e.received_at >= cutoff);
    sort_oldest_first(&mut emails);
    emails
}

#[async_trait]
impl EmailSource for ImapSource {
    fn name(&self) -> &str {
        "imap"
    }

    async fn fetch_recent(&self, window: Duration) -> Result<Vec<RawEmail>, ChannelError> {
        let emails = self.fetch(window, FetchPart::Full).await?;
        info!(
            mailbox = %self.config.mailbox,
            count = emails.len(),
            window_hours = window.as_secs() / 3600,
            "Fetched candidate emails"
        );
        Ok(emails)
    }
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> Result<DateTime<Utc>, ChannelError> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .ok_or_else(|| ChannelError::Protocol(format!("window {window:?} out of range")))
}

// ── Search criteria ─────────────────────────────────────────────────

/// `SINCE <date>` plus the subject terms folded into nested ORs.
///
/// IMAP `OR` is binary prefix: `OR a OR b c`.
pub(crate) fn search_criteria(since: NaiveDate, terms: &[String]) -> String {
    let since = format!("SINCE {}", since.format("%d-%b-%Y"));
    let subjects: Vec<String> = terms
        .iter()
        .map(|t| format!("SUBJECT {}", quote(t)))
        .collect();

    match subjects.split_last() {
        None => since,
        Some((last, rest)) => {
            let mut expr = last.clone();
            for s in rest.iter().rev() {
                expr = format!("OR {s} {expr}");
            }
            format!("{since} {expr}")
        }
    }
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

// ── Session ─────────────────────────────────────────────────────────

/// One tagged command's output.
#[derive(Debug, Default)]
struct Response {
    /// Untagged lines, CRLF stripped.
    lines: Vec<String>,
    /// Literal payloads (`{n}` blocks) in arrival order.
    literals: Vec<Vec<u8>>,
}

/// Minimal IMAP client over any byte stream.
struct ImapSession<S: Read + Write> {
    stream: S,
    next_tag: u32,
}

impl<S: Read + Write> ImapSession<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            next_tag: 1,
        }
    }

    fn read_line(&mut self) -> Result<String, ChannelError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(ChannelError::Protocol("connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        buf.truncate(buf.len() - 2);
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
                Err(e) => return Err(ChannelError::Protocol(e.to_string())),
            }
        }
    }

    fn read_greeting(&mut self) -> Result<(), ChannelError> {
        let greeting = self.read_line()?;
        if greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(ChannelError::Protocol(format!("unexpected greeting: {greeting}")))
        }
    }

    /// Send one command and collect everything up to its tagged reply.
    fn command(&mut self, cmd: &str) -> Result<Response, ChannelError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;

        let tagged = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&tagged) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                let verb = cmd.split_whitespace().next().unwrap_or(cmd);
                return Err(ChannelError::Protocol(format!("{verb}: {status}")));
            }
            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.stream
                    .read_exact(&mut literal)
                    .map_err(|e| ChannelError::Protocol(e.to_string()))?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), ChannelError> {
        self.command(&format!("LOGIN {} {}", quote(username), quote(password)))
            .map(|_| ())
            .map_err(|_| ChannelError::AuthFailed {
                username: username.to_string(),
            })
    }

    fn examine(&mut self, mailbox: &str) -> Result<(), ChannelError> {
        self.command(&format!("EXAMINE {}", quote(mailbox))).map(|_| ())
    }

    fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, ChannelError> {
        let response = self.command(&format!("UID SEARCH {criteria}"))?;
        Ok(response
            .lines
            .iter()
            .filter_map(|l| l.strip_prefix("* SEARCH"))
            .flat_map(|rest| rest.split_whitespace())
            .filter_map(|uid| uid.parse().ok())
            .collect())
    }

    fn uid_fetch(&mut self, uid: u32, part: FetchPart) -> Result<Option<Vec<u8>>, ChannelError> {
        let response = self.command(&format!("UID FETCH {uid} {}", part.item()))?;
        Ok(response.literals.into_iter().next())
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "LOGOUT failed");
        }
    }
}

/// Length of a trailing `{n}` literal marker.
fn literal_len(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    line[open + 1..].strip_suffix('}')?.parse().ok()
}

// ── Fetch ───────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

fn connect(config: &MailConfig) -> Result<TlsStream, ChannelError> {
    let connect_err = |reason: String| ChannelError::ConnectFailed {
        host: config.imap_host.clone(),
        reason,
    };

    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
        .map_err(|e| connect_err(e.to_string()))?;
    tcp.set_read_timeout(Some(READ_TIMEOUT))
        .map_err(|e| connect_err(e.to_string()))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
        .map_err(|e| connect_err(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| connect_err(e.to_string()))?;

    Ok(rustls::StreamOwned::new(conn, tcp))
}

fn fetch_blocking(
    config: &MailConfig,
    cutoff: DateTime<Utc>,
    part: FetchPart,
) -> Result<Vec<RawEmail>, ChannelError> {
    let stream = connect(config)?;
    fetch_from(ImapSession::new(stream), config, cutoff, part)
}

fn fetch_from<S: Read + Write>(
    mut session: ImapSession<S>,
    config: &MailConfig,
    cutoff: DateTime<Utc>,
    part: FetchPart,
) -> Result<Vec<RawEmail>, ChannelError> {
    session.read_greeting()?;
    session.login(&config.username, config.password.expose_secret())?;
    session.examine(&config.mailbox)?;

    let criteria = search_criteria(cutoff.date_naive(), &config.subject_terms);
    let uids = session.uid_search(&criteria)?;
    debug!(count = uids.len(), %criteria, "IMAP search");

    let mut emails = Vec::with_capacity(uids.len());
    for uid in uids {
        let Some(raw) = session.uid_fetch(uid, part)? else {
            warn!(uid, "FETCH returned no message data");
            continue;
        };
        match parse_message(uid, &raw) {
            Some(email) if part == FetchPart::HeadersOnly || !email.body.trim().is_empty() => {
                emails.push(email)
            }
            Some(email) => debug!(uid, subject = %email.subject, "Skipping email with empty body"),
            None => warn!(uid, "Unparseable message"),
        }
    }

    session.logout();
    Ok(emails)
}

// ── Parsing ─────────────────────────────────────────────────────────

fn parse_message(uid: u32, raw: &[u8]) -> Option<RawEmail> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .unwrap_or("unknown")
        .to_string();

    let received_at = parsed
        .date()
        .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single())
        .unwrap_or_else(Utc::now);

    Some(RawEmail {
        id: parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("uid-{uid}")),
        subject: parsed.subject().unwrap_or("").trim().to_string(),
        sender,
        body: strip_quoted_text(&body_text(&parsed)),
        received_at,
    })
}

/// text/plain when present, otherwise stripped HTML.
fn body_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.into_owned();
    }
    parsed
        .body_html(0)
        .map(|html| strip_html(&html))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Scripted server: reads come from `input`, writes are captured.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(script: &[u8]) -> Self {
            Self {
                input: Cursor::new(script.to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config() -> MailConfig {
        MailConfig {
            imap_host: "imap.test".into(),
            imap_port: 993,
            username: "me@test".into(),
            password: SecretString::from("pw"),
            mailbox: "INBOX".into(),
            subject_terms: vec!["application".into(), "interview".into()],
        }
    }

    fn message(id: &str, date: &str, subject: &str, body: &str) -> String {
        format!(
            "Message-ID: <{id}>\r\nFrom: Careers <careers@acme.com>\r\nDate: {date}\r\nSubject: {subject}\r\nContent-Type: text/plain\r\n\r\n{body}\r\n"
        )
    }

    fn fetch_reply(tag: &str, uid: u32, msg: &str) -> String {
        format!(
            "* {uid} FETCH (UID {uid} BODY[] {{{}}}\r\n{msg})\r\n{tag} OK FETCH done\r\n",
            msg.len()
        )
    }

    #[test]
    fn criteria_folds_subjects_into_ors() {
        let since = NaiveDate::from_ymd_opt(2026, 10, 5).unwrap();
        let terms = vec!["application".to_string(), "interview".to_string(), "assessment".to_string()];
        assert_eq!(
            search_criteria(since, &terms),
            r#"SINCE 05-Oct-2026 OR SUBJECT "application" OR SUBJECT "interview" SUBJECT "assessment""#
        );
    }

    #[test]
    fn criteria_single_and_no_terms() {
        let since = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(
            search_criteria(since, &["offer".to_string()]),
            r#"SINCE 31-Jan-2026 SUBJECT "offer""#
        );
        assert_eq!(search_criteria(since, &[]), "SINCE 31-Jan-2026");
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn literal_marker_parsed() {
        assert_eq!(literal_len("* 1 FETCH (UID 7 BODY[] {342}"), Some(342));
        assert_eq!(literal_len("* SEARCH 1 2"), None);
        assert_eq!(literal_len("* 1 FETCH {abc}"), None);
    }

    #[test]
    fn full_session_fetches_and_parses() {
        let first = message(
            "one@acme",
            "Mon, 12 Oct 2026 09:00:00 +0000",
            "Your application to Acme",
            "Thanks for applying to the Backend Engineer role.",
        );
        let second = message(
            "two@acme",
            "Tue, 13 Oct 2026 10:00:00 +0000",
            "Interview invitation",
            "We'd like to invite you to interview.\r\n> quoted earlier mail",
        );

        let script = format!(
            "* OK IMAP ready\r\n\
             A1 OK LOGIN completed\r\n\
             * 2 EXISTS\r\nA2 OK [READ-ONLY] EXAMINE completed\r\n\
             * SEARCH 41 42\r\nA3 OK SEARCH completed\r\n\
             {}{}\
             * BYE\r\nA6 OK LOGOUT completed\r\n",
            fetch_reply("A4", 41, &first),
            fetch_reply("A5", 42, &second),
        );

        let session = ImapSession::new(ScriptedStream::new(script.as_bytes()));
        let cutoff = Utc.with_ymd_and_hms(2026, 10, 11, 0, 0, 0).unwrap();
        let emails = fetch_from(session, &config(), cutoff, FetchPart::Full).unwrap();

        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].id, "one@acme");
        assert_eq!(emails[0].sender, "careers@acme.com");
        assert_eq!(emails[0].subject, "Your application to Acme");
        assert!(emails[0].body.contains("Backend Engineer"));
        assert_eq!(
            emails[1].received_at,
            Utc.with_ymd_and_hms(2026, 10, 13, 10, 0, 0).unwrap()
        );
        assert!(!emails[1].body.contains("quoted"));
    }

    #[test]
    fn session_is_read_only_and_peeks() {
        let script = "* OK ready\r\nA1 OK\r\nA2 OK\r\n* SEARCH\r\nA3 OK\r\nA4 OK\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script.as_bytes()));
        session.read_greeting().unwrap();
        session.login("me", "pw").unwrap();
        session.examine("INBOX").unwrap();
        assert!(session.uid_search("SINCE 01-Jan-2026").unwrap().is_empty());
        session.logout();

        let sent = String::from_utf8(session.stream.written).unwrap();
        assert!(sent.contains("A2 EXAMINE \"INBOX\""));
        assert!(!sent.contains("SELECT"));
        assert!(!sent.contains("STORE"));
    }

    #[test]
    fn rejected_login_is_auth_error() {
        let script = "* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n";
        let mut session = ImapSession::new(ScriptedStream::new(script.as_bytes()));
        session.read_greeting().unwrap();
        let err = session.login("me@test", "bad").unwrap_err();
        assert!(matches!(err, ChannelError::AuthFailed { ref username } if username == "me@test"));
    }

    #[test]
    fn closed_connection_is_protocol_error() {
        let mut session = ImapSession::new(ScriptedStream::new(b"* OK ready\r\n"));
        session.read_greeting().unwrap();
        assert!(matches!(
            session.examine("INBOX"),
            Err(ChannelError::Protocol(_))
        ));
    }

    #[test]
    fn html_only_message_is_stripped() {
        let raw = "Message-ID: <h@x>\r\nFrom: a@x.com\r\nSubject: Update on your application\r\nContent-Type: text/html\r\n\r\n<p>You have moved to the <b>assessment</b> stage.</p>\r\n";
        let email = parse_message(9, raw.as_bytes()).unwrap();
        assert!(email.body.contains("assessment"));
        assert!(!email.body.contains('<'));
    }

    #[test]
    fn missing_message_id_falls_back_to_uid() {
        let raw = "From: a@x.com\r\nSubject: hi\r\n\r\nbody\r\n";
        let email = parse_message(77, raw.as_bytes()).unwrap();
        assert_eq!(email.id, "uid-77");
    }

    #[test]
    fn cutoff_subtracts_window() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(
            cutoff(now, Duration::from_secs(24 * 3600)).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn blank_body_is_skipped_in_full_fetch() {
        let blank = message("blank@acme", "Mon, 12 Oct 2026 09:00:00 +0000", "Application update", "   ");
        let real = message(
            "real@acme",
            "Mon, 12 Oct 2026 10:00:00 +0000",
            "Your application to Acme",
            "Thanks for applying.",
        );
        let script = format!(
            "* OK IMAP ready\r\n\
             A1 OK LOGIN completed\r\n\
             A2 OK [READ-ONLY] EXAMINE completed\r\n\
             * SEARCH 5 6\r\nA3 OK SEARCH completed\r\n\
             {}{}\
             * BYE\r\nA6 OK LOGOUT completed\r\n",
            fetch_reply("A4", 5, &blank),
            fetch_reply("A5", 6, &real),
        );

        let session = ImapSession::new(ScriptedStream::new(script.as_bytes()));
        let cutoff = Utc.with_ymd_and_hms(2026, 10, 11, 0, 0, 0).unwrap();
        let emails = fetch_from(session, &config(), cutoff, FetchPart::Full).unwrap();

        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, "real@acme");
    }

    #[test]
    fn window_drops_mail_from_earlier_on_the_cutoff_day() {
        let at = |id: &str, hour: u32, minute: u32| RawEmail {
            id: id.into(),
            subject: id.into(),
            sender: "a@x.com".into(),
            body: "b".into(),
            received_at: Utc.with_ymd_and_hms(2026, 10, 18, hour, minute, 0).unwrap(),
        };
        let cutoff = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let emails = vec![at("later", 15, 0), at("morning", 8, 30), at("exact", 12, 0), at("just-before", 11, 59)];

        let kept: Vec<String> = within_window(emails, cutoff).into_iter().map(|e| e.id).collect();
        assert_eq!(kept, vec!["exact".to_string(), "later".to_string()]);
    }
}
