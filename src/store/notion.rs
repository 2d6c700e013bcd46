//! Notion database as the tracking store.
//!
//! Property mapping:
//! - `Role`: title
//! - `Company`: rich_text
//! - `Status`: select
//! - `Source`: select (`N/A` when unknown)
//! - `Applied Date`: date, set on insert only

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{env_opt, env_parse, env_required};
use crate::error::{ConfigError, StoreError};
use crate::store::TrackingStore;
use crate::tracker::{
    ApplicationId, ApplicationSource, ApplicationStatus, FieldChanges, NewApplication,
    TrackedApplication,
};

pub const DEFAULT_NOTION_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// How an unknown source is written to the `Source` select.
const SOURCE_NOT_AVAILABLE: &str = "N/A";

const PROP_ROLE: &str = "Role";
const PROP_COMPANY: &str = "Company";
const PROP_STATUS: &str = "Status";
const PROP_SOURCE: &str = "Source";
const PROP_APPLIED_DATE: &str = "Applied Date";

/// Notion connection settings.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: SecretString,
    pub database_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl NotionConfig {
    /// Build from `NOTION_API_KEY`, `NOTION_DATABASE_ID`, `NOTION_BASE_URL`,
    /// `NOTION_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: SecretString::from(env_required("NOTION_API_KEY")?),
            database_id: env_required("NOTION_DATABASE_ID")?,
            base_url: env_opt("NOTION_BASE_URL").unwrap_or_else(|| DEFAULT_NOTION_URL.into()),
            timeout: Duration::from_secs(env_parse("NOTION_TIMEOUT_SECS", 30)?),
        })
    }
}

pub struct NotionStore {
    client: Client,
    config: NotionConfig,
}

impl NotionStore {
    pub fn new(mut config: NotionConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Read(format!("Failed to create HTTP client: {e}")))?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Page>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

/// Concatenated `plain_text` of a title or rich_text property.
fn plain_text(prop: Option<&Value>, kind: &str) -> String {
    prop.and_then(|p| p.get(kind))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Name of the selected option, if any.
fn select_name(prop: Option<&Value>) -> Option<&str> {
    prop.and_then(|p| p.get("select"))
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
}

/// Parse the `Source` select. A label outside the vocabulary is kept as
/// `other_source` so it still counts as set; only empty, `N/A` and
/// `Unknown` mean unset.
fn parse_source(name: Option<&str>) -> (ApplicationSource, Option<String>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (ApplicationSource::Unknown, None);
    };
    let source = ApplicationSource::from_label(name);
    let unset = name.eq_ignore_ascii_case(SOURCE_NOT_AVAILABLE)
        || name.eq_ignore_ascii_case(ApplicationSource::Unknown.as_str());
    if source.is_known() || unset {
        (source, None)
    } else {
        (source, Some(name.to_string()))
    }
}

fn page_to_application(page: Page) -> TrackedApplication {
    let props = &page.properties;
    let (source, other_source) = parse_source(select_name(props.get(PROP_SOURCE)));
    TrackedApplication {
        id: ApplicationId::new(page.id),
        company: plain_text(props.get(PROP_COMPANY), "rich_text"),
        role: plain_text(props.get(PROP_ROLE), "title"),
        status: select_name(props.get(PROP_STATUS))
            .map(ApplicationStatus::from_label)
            .unwrap_or(ApplicationStatus::Unknown),
        source,
        other_source,
    }
}

fn source_label(source: ApplicationSource) -> &'static str {
    if source.is_known() {
        source.as_str()
    } else {
        SOURCE_NOT_AVAILABLE
    }
}

fn select(name: &str) -> Value {
    json!({ "select": { "name": name } })
}

fn insert_properties(record: &NewApplication, today: &str) -> Value {
    json!({
        PROP_ROLE: { "title": [{ "text": { "content": record.role } }] },
        PROP_COMPANY: { "rich_text": [{ "text": { "content": record.company } }] },
        PROP_STATUS: select(record.status.as_str()),
        PROP_SOURCE: select(source_label(record.source)),
        PROP_APPLIED_DATE: { "date": { "start": today } },
    })
}

fn update_properties(changes: &FieldChanges) -> Value {
    let mut props = serde_json::Map::new();
    if let Some(status) = changes.status {
        props.insert(PROP_STATUS.into(), select(status.as_str()));
    }
    if let Some(source) = changes.source {
        props.insert(PROP_SOURCE.into(), select(source_label(source)));
    }
    Value::Object(props)
}

async fn http_error(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Http { status, body }
}

#[async_trait]
impl TrackingStore for NotionStore {
    fn name(&self) -> &str {
        "notion"
    }

    async fn list_all(&self) -> Result<Vec<TrackedApplication>, StoreError> {
        let path = format!("/v1/databases/{}/query", self.config.database_id);
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let response = self
                .request(reqwest::Method::POST, &path)
                .json(&body)
                .send()
                .await
                .map_err(|e| StoreError::Read(e.to_string()))?;
            if !response.status().is_success() {
                return Err(http_error(response).await);
            }

            let page: QueryResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            pages += 1;
            rows.extend(page.results.into_iter().map(page_to_application));

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                (true, None) => {
                    return Err(StoreError::Malformed(
                        "has_more set without next_cursor".into(),
                    ));
                }
                (false, _) => break,
            }
        }

        info!(rows = rows.len(), pages, "Read Notion database");
        Ok(rows)
    }

    async fn insert(&self, record: &NewApplication) -> Result<ApplicationId, StoreError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let body = json!({
            "parent": { "database_id": self.config.database_id },
            "properties": insert_properties(record, &today),
        });

        let response = self
            .request(reqwest::Method::POST, "/v1/pages")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Write {
                target: format!("{} at {}", record.role, record.company),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let created: CreatedPage = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        debug!(page_id = %created.id, "Created Notion page");
        Ok(ApplicationId::new(created.id))
    }

    async fn update(&self, id: &ApplicationId, changes: &FieldChanges) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let response = self
            .request(reqwest::Method::PATCH, &format!("/v1/pages/{id}"))
            .json(&json!({ "properties": update_properties(changes) }))
            .send()
            .await
            .map_err(|e| StoreError::Write {
                target: id.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        debug!(page_id = %id, %changes, "Updated Notion page");
        Ok(())
    }
}
