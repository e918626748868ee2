//! Notion HTTP API source.
//!
//! Pages come from a database query, bodies from the block children
//! endpoint. Every request goes through the configured [`RetryPolicy`];
//! error statuses are mapped with [`status_error`] so 429/5xx are retried
//! and 4xx fail fast.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{ChildBlock, ContentSource, Listing};
use crate::block::{Block, BlockKind, MediaKind, MediaSource, RichText, plain_text};
use crate::config::SyncConfig;
use crate::http::{build_client, status_error};
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{PageMeta, PageRecord};
use crate::{Error, Result};

/// Properties the database schema is expected to carry, with their types.
pub const REQUIRED_PROPERTIES: [(&str, &str); 5] = [
    ("Title", "title"),
    ("Published", "checkbox"),
    ("Date", "date"),
    ("Slug", "rich_text"),
    ("Tags", "multi_select"),
];

/// Outcome of [`NotionClient::check_database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseReport {
    /// Database title.
    pub title: String,
    /// `(name, type)` of every property, sorted by name.
    pub properties: Vec<(String, String)>,
    /// Missing or mistyped required properties.
    pub warnings: Vec<String>,
    /// Pages returned by a one-item sample query.
    pub sample_count: usize,
    /// The sample query had more results.
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ListResponse {
    fn cursor(&self) -> Option<String> {
        if self.has_more {
            self.next_cursor.clone()
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Client for one Notion database.
pub struct NotionClient {
    client: Client,
    api_base: String,
    api_version: String,
    token: String,
    database_id: String,
    page_size: u32,
    include_drafts: bool,
    policy: RetryPolicy,
}

impl NotionClient {
    /// Client authenticating with `token`.
    pub fn new(config: &SyncConfig, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(&config.download)?,
            api_base: config.source.api_base.trim_end_matches('/').to_string(),
            api_version: config.source.api_version.clone(),
            token: token.into(),
            database_id: config.source.database_id.trim().to_string(),
            page_size: config.source.page_size.clamp(1, 100),
            include_drafts: config.output.include_drafts,
            policy: RetryPolicy::from_config(&config.retry),
        })
    }

    /// Client reading its token from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the variable is unset or empty.
    pub fn from_env(config: &SyncConfig) -> Result<Self> {
        let name = &config.source.token_env;
        let token = std::env::var(name)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{name} is not set")))?;
        Self::new(config, token.trim())
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
    }

    /// Send a request built by `build`, retrying per policy, and decode JSON.
    async fn send_json<F>(&self, label: &str, url: &str, build: F) -> Result<Value>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let outcome = self
            .policy
            .run(label, || {
                let request = self.authorized(build());
                let url = url.to_string();
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        let headers = response.headers().clone();
                        let body = response.json::<ApiError>().await.ok();
                        if let Some(err) = &body {
                            debug!(url = %url, code = %err.code, "Notion API error");
                        }
                        return Err(status_error(
                            status,
                            &headers,
                            &url,
                            body.map(|e| e.message),
                        ));
                    }
                    response
                        .json::<Value>()
                        .await
                        .map_err(|e| Error::Parse(format!("Invalid response from {url}: {e}")))
                }
            })
            .await;
        outcome
            .map(|done| done.value)
            .map_err(RetryError::into_inner)
    }

    async fn query(&self, body: Value) -> Result<ListResponse> {
        let url = self.url(&format!("databases/{}/query", self.database_id));
        let value = self
            .send_json("query_database", &url, || {
                self.client.post(&url).json(&body)
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Verify the token, database access and schema.
    ///
    /// Schema mismatches are reported as warnings; access problems are
    /// errors.
    pub async fn check_database(&self) -> Result<DatabaseReport> {
        let me_url = self.url("users/me");
        let me = self
            .send_json("users_me", &me_url, || self.client.get(&me_url))
            .await?;
        info!(
            bot_id = me.get("id").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Token is valid"
        );

        let db_url = self.url(&format!("databases/{}", self.database_id));
        let database = self
            .send_json("retrieve_database", &db_url, || self.client.get(&db_url))
            .await?;
        let title = database
            .get("title")
            .map(rich_text_array)
            .map(|runs| plain_text(&runs))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| PageRecord::UNTITLED.to_string());

        let mut properties: Vec<(String, String)> = database
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| (name.clone(), str_field(prop, "type").to_string()))
                    .collect()
            })
            .unwrap_or_default();
        properties.sort();

        let warnings = schema_warnings(&properties);
        for warning in &warnings {
            warn!(database = %title, "{warning}");
        }

        let sample = self.query(json!({ "page_size": 1 })).await?;
        Ok(DatabaseReport {
            title,
            properties,
            warnings,
            sample_count: sample.results.len(),
            has_more: sample.has_more,
        })
    }
}

#[async_trait::async_trait]
impl ContentSource for NotionClient {
    async fn list_pages(&self, cursor: Option<&str>) -> Result<Listing<PageRecord>> {
        let mut body = json!({ "page_size": self.page_size });
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        if !self.include_drafts {
            body["filter"] = json!({
                "property": "Published",
                "checkbox": { "equals": true }
            });
        }

        let response = self.query(body).await?;
        let next_cursor = response.cursor();
        let items = response
            .results
            .iter()
            .filter_map(|page| match parse_page(page) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(page_id = str_field(page, "id"), error = %e, "Skipping malformed page");
                    None
                },
            })
            .collect();
        Ok(Listing { items, next_cursor })
    }

    async fn block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<Listing<ChildBlock>> {
        let url = self.url(&format!("blocks/{block_id}/children"));
        let mut query = vec![("page_size", "100".to_string())];
        if let Some(cursor) = cursor {
            query.push(("start_cursor", cursor.to_string()));
        }
        let value = self
            .send_json("block_children", &url, || self.client.get(&url).query(&query))
            .await?;
        let response: ListResponse = serde_json::from_value(value)?;
        let next_cursor = response.cursor();
        let items = response.results.iter().filter_map(parse_block).collect();
        Ok(Listing { items, next_cursor })
    }
}

fn schema_warnings(properties: &[(String, String)]) -> Vec<String> {
    let mut missing = Vec::new();
    let mut mistyped = Vec::new();
    for (name, expected) in REQUIRED_PROPERTIES {
        match properties.iter().find(|(n, _)| n == name) {
            None => missing.push(name),
            Some((_, actual)) if actual != expected => {
                mistyped.push(format!("{name} (expected {expected}, got {actual})"));
            },
            Some(_) => {},
        }
    }

    let mut warnings = Vec::new();
    if !missing.is_empty() {
        warnings.push(format!("Missing properties: {}", missing.join(", ")));
    }
    if !mistyped.is_empty() {
        warnings.push(format!("Wrong property types: {}", mistyped.join(", ")));
    }
    warnings
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn rich_text_array(value: &Value) -> Vec<RichText> {
    value
        .as_array()
        .map(|runs| runs.iter().map(parse_rich_text).collect())
        .unwrap_or_default()
}

fn parse_rich_text(value: &Value) -> RichText {
    let equation = str_field(value, "type") == "equation";
    let plain_text = if equation {
        value
            .pointer("/equation/expression")
            .and_then(Value::as_str)
            .unwrap_or_else(|| str_field(value, "plain_text"))
    } else {
        str_field(value, "plain_text")
    };
    RichText {
        plain_text: plain_text.to_string(),
        href: value.get("href").and_then(Value::as_str).map(str::to_string),
        annotations: value
            .get("annotations")
            .cloned()
            .and_then(|a| serde_json::from_value(a).ok())
            .unwrap_or_default(),
        equation,
    }
}

fn media_source(value: &Value) -> Option<MediaSource> {
    match str_field(value, "type") {
        "external" => value
            .pointer("/external/url")
            .and_then(Value::as_str)
            .map(|u| MediaSource::External(u.to_string())),
        "file" => value
            .pointer("/file/url")
            .and_then(Value::as_str)
            .map(|u| MediaSource::Hosted(u.to_string())),
        _ => None,
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn property<'a>(props: &'a Value, name: &str) -> Option<&'a Value> {
    props.get(name).filter(|p| !p.is_null())
}

/// Build a [`PageRecord`] from a database query result.
fn parse_page(page: &Value) -> Result<PageRecord> {
    let id = str_field(page, "id");
    if id.is_empty() {
        return Err(Error::Parse("page without id".to_string()));
    }
    let last_edited_raw = str_field(page, "last_edited_time");
    let last_edited = parse_datetime(last_edited_raw)
        .ok_or_else(|| Error::Parse(format!("page {id}: bad last_edited_time")))?;

    let props = page.get("properties").unwrap_or(&Value::Null);
    let prop = |name| property(props, name);

    let title_prop = prop("Title")
        .filter(|p| str_field(p, "type") == "title" || p.get("title").is_some())
        .or_else(|| {
            props
                .as_object()
                .and_then(|all| all.values().find(|p| str_field(p, "type") == "title"))
        });
    let title = title_prop
        .and_then(|p| p.get("title"))
        .map(|t| plain_text(&rich_text_array(t)).trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| PageRecord::UNTITLED.to_string());

    let slug = prop("Slug")
        .and_then(|p| p.get("rich_text"))
        .map(|t| plain_text(&rich_text_array(t)).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| PageRecord::default_slug(id));

    let date = prop("Date")
        .and_then(|p| p.pointer("/date/start"))
        .and_then(Value::as_str)
        .and_then(parse_datetime)
        .or_else(|| parse_datetime(str_field(page, "created_time")))
        .unwrap_or(last_edited);

    let tags = prop("Tags")
        .and_then(|p| p.get("multi_select"))
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .map(|o| str_field(o, "name").to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let published = prop("Published")
        .and_then(|p| p.get("checkbox"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(PageRecord {
        id: id.to_string(),
        revision: Some(last_edited_raw.to_string()),
        meta: PageMeta {
            title,
            slug,
            date,
            last_edited,
            tags,
            published,
            cover: page.get("cover").and_then(media_source),
        },
    })
}

/// Map one block object onto the typed model; `None` if it has no id.
fn parse_block(value: &Value) -> Option<ChildBlock> {
    let id = str_field(value, "id");
    if id.is_empty() {
        return None;
    }
    let tag = str_field(value, "type");
    let payload = value.get(tag).cloned().unwrap_or(Value::Null);
    let text = || rich_text_array(payload.get("rich_text").unwrap_or(&Value::Null));
    let caption = || rich_text_array(payload.get("caption").unwrap_or(&Value::Null));
    let url = || str_field(&payload, "url").to_string();

    let kind = match tag {
        "paragraph" => BlockKind::Paragraph { text: text() },
        "heading_1" | "heading_2" | "heading_3" => BlockKind::Heading {
            level: tag[tag.len() - 1..].parse().unwrap_or(1),
            text: text(),
        },
        "bulleted_list_item" => BlockKind::BulletedListItem { text: text() },
        "numbered_list_item" => BlockKind::NumberedListItem { text: text() },
        "to_do" => BlockKind::ToDo {
            text: text(),
            checked: payload
                .get("checked")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        "code" => BlockKind::Code {
            text: text(),
            language: str_field(&payload, "language").to_string(),
            caption: caption(),
        },
        "quote" => BlockKind::Quote { text: text() },
        "toggle" => BlockKind::Toggle { text: text() },
        "callout" => BlockKind::Callout {
            text: text(),
            icon: payload
                .pointer("/icon/emoji")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "divider" => BlockKind::Divider,
        "table" => BlockKind::Table {
            has_column_header: payload
                .get("has_column_header")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        "table_row" => BlockKind::TableRow {
            cells: payload
                .get("cells")
                .and_then(Value::as_array)
                .map(|cells| cells.iter().map(rich_text_array).collect())
                .unwrap_or_default(),
        },
        "embed" => BlockKind::Embed {
            url: url(),
            caption: caption(),
        },
        "bookmark" => BlockKind::Bookmark {
            url: url(),
            caption: caption(),
        },
        "equation" => BlockKind::Equation {
            expression: str_field(&payload, "expression").to_string(),
        },
        "image" | "video" | "audio" | "pdf" | "file" => {
            let kind = match tag {
                "image" => MediaKind::Image,
                "video" => MediaKind::Video,
                "audio" => MediaKind::Audio,
                "pdf" => MediaKind::Pdf,
                _ => MediaKind::File,
            };
            match media_source(&payload) {
                Some(source) => BlockKind::Media {
                    kind,
                    source,
                    caption: caption(),
                },
                None => unsupported(tag, &payload),
            }
        },
        _ => unsupported(tag, &payload),
    };

    Some(ChildBlock {
        block: Block::new(id, kind),
        has_children: value
            .get("has_children")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn unsupported(tag: &str, payload: &Value) -> BlockKind {
    let salvaged = payload
        .get("rich_text")
        .or_else(|| payload.get("caption"))
        .map(|t| plain_text(&rich_text_array(t)))
        .filter(|t| !t.is_empty())
        .or_else(|| payload.get("title").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();
    BlockKind::Unsupported {
        type_tag: (if tag.is_empty() { "unknown" } else { tag }).to_string(),
        plain_text: salvaged,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::source::{collect_pages, fetch_block_tree};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, include_drafts: bool) -> NotionClient {
        let mut config = SyncConfig::default();
        config.source.api_base = format!("{}/v1", server.uri());
        config.source.database_id = "db1".to_string();
        config.output.include_drafts = include_drafts;
        NotionClient::new(&config, "secret-token")
            .unwrap()
            .with_policy(RetryPolicy::new(3, Duration::from_millis(5)))
    }

    fn page_json(id: &str, slug: Option<&str>) -> Value {
        let slug_runs = slug.map_or_else(Vec::new, |s| vec![json!({ "plain_text": s })]);
        json!({
            "object": "page",
            "id": id,
            "created_time": "2024-04-30T09:00:00.000Z",
            "last_edited_time": "2024-05-02T08:30:00.000Z",
            "cover": { "type": "file", "file": { "url": "https://files.example.com/c.jpg?X-Amz=1" } },
            "properties": {
                "Title": { "type": "title", "title": [
                    { "plain_text": "Hello " }, { "plain_text": "World" }
                ] },
                "Slug": { "type": "rich_text", "rich_text": slug_runs },
                "Date": { "type": "date", "date": { "start": "2024-05-01" } },
                "Tags": { "type": "multi_select", "multi_select": [
                    { "name": "rust" }, { "name": "notes" }
                ] },
                "Published": { "type": "checkbox", "checkbox": true }
            }
        })
    }

    #[tokio::test]
    async fn test_list_pages_sends_filter_and_parses_properties() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(header("authorization", "Bearer secret-token"))
            .and(header("notion-version", "2022-06-28"))
            .and(body_partial_json(json!({
                "filter": { "property": "Published", "checkbox": { "equals": true } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("ab-cd-ef", None), { "object": "page" }],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listing = client(&server, false).list_pages(None).await?;
        assert_eq!(listing.items.len(), 1);
        assert!(listing.next_cursor.is_none());

        let page = &listing.items[0];
        assert_eq!(page.meta.title, "Hello World");
        assert_eq!(page.meta.slug, "abcdef");
        assert_eq!(page.meta.tags, vec!["rust", "notes"]);
        assert!(page.meta.published);
        assert_eq!(page.meta.date.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert_eq!(page.revision.as_deref(), Some("2024-05-02T08:30:00.000Z"));
        assert!(matches!(page.meta.cover, Some(MediaSource::Hosted(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_drafts_mode_omits_filter_and_follows_cursor() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("p1", Some("first"))],
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("p2", Some("second"))],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;

        let notion = client(&server, true);
        let pages = collect_pages(&notion).await?;
        let slugs: Vec<_> = pages.iter().map(|p| p.meta.slug.as_str()).collect();
        assert_eq!(slugs, vec!["first", "second"]);

        let requests = server.received_requests().await.unwrap();
        let first: Value = serde_json::from_slice(&requests[0].body)?;
        assert!(first.get("filter").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "object": "error",
                "status": 401,
                "code": "unauthorized",
                "message": "API token is invalid."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, false).list_pages(None).await.unwrap_err();
        match err {
            Error::Unauthorized(message) => assert_eq!(message, "API token is invalid."),
            other => panic!("expected unauthorized, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [], "has_more": false, "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listing = client(&server, false).list_pages(None).await?;
        assert!(listing.items.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_block_children_map_to_typed_blocks() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/blocks/page-1/children"))
            .and(query_param("page_size", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "h", "type": "heading_2", "has_children": false,
                      "heading_2": { "rich_text": [{ "type": "text", "plain_text": "Intro" }] } },
                    { "id": "t", "type": "to_do", "has_children": true,
                      "to_do": { "rich_text": [{ "type": "text", "plain_text": "ship" }], "checked": true } },
                    { "id": "i", "type": "image", "has_children": false,
                      "image": { "type": "file", "file": { "url": "https://files.example.com/a.png?sig=1" }, "caption": [] } },
                    { "id": "e", "type": "paragraph", "has_children": false,
                      "paragraph": { "rich_text": [{ "type": "equation", "plain_text": "x",
                        "equation": { "expression": "x^2" } }] } },
                    { "id": "s", "type": "synced_block", "has_children": false, "synced_block": {} },
                    { "id": "c", "type": "child_page", "has_children": false, "child_page": { "title": "Sub" } }
                ],
                "has_more": false,
                "next_cursor": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/blocks/t/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "t1", "type": "divider", "has_children": false, "divider": {} }
                ],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let blocks = fetch_block_tree(&client(&server, false), "page-1").await?.blocks;
        assert_eq!(blocks.len(), 6);
        assert!(matches!(&blocks[0].kind, BlockKind::Heading { level: 2, .. }));
        assert!(matches!(blocks[1].kind, BlockKind::ToDo { checked: true, .. }));
        assert_eq!(blocks[1].children.len(), 1);
        assert!(matches!(
            &blocks[2].kind,
            BlockKind::Media { kind: MediaKind::Image, source: MediaSource::Hosted(_), .. }
        ));
        match &blocks[3].kind {
            BlockKind::Paragraph { text } => {
                assert!(text[0].equation);
                assert_eq!(text[0].plain_text, "x^2");
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &blocks[4].kind,
            BlockKind::Unsupported { type_tag, plain_text } if type_tag == "synced_block" && plain_text.is_empty()
        ));
        assert!(matches!(
            &blocks[5].kind,
            BlockKind::Unsupported { plain_text, .. } if plain_text == "Sub"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_database_reports_schema_problems() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "bot-1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/db1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": [{ "plain_text": "Blog" }],
                "properties": {
                    "Title": { "type": "title" },
                    "Published": { "type": "checkbox" },
                    "Date": { "type": "rich_text" },
                    "Tags": { "type": "multi_select" }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/db1/query"))
            .and(body_partial_json(json!({ "page_size": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [page_json("p1", None)], "has_more": true, "next_cursor": "x"
            })))
            .mount(&server)
            .await;

        let report = client(&server, false).check_database().await?;
        assert_eq!(report.title, "Blog");
        assert_eq!(report.properties.len(), 4);
        assert_eq!(
            report.warnings,
            vec![
                "Missing properties: Slug".to_string(),
                "Wrong property types: Date (expected date, got rich_text)".to_string(),
            ]
        );
        assert_eq!(report.sample_count, 1);
        assert!(report.has_more);
        Ok(())
    }

    #[test]
    fn test_from_env_requires_token() {
        let mut config = SyncConfig::default();
        config.source.token_env = "PAGESYNC_TEST_TOKEN_THAT_IS_NEVER_SET".to_string();
        assert!(matches!(
            NotionClient::from_env(&config),
            Err(Error::Config(_))
        ));
    }
}
