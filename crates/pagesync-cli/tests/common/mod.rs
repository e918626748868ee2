#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// `pagesync` running in `workdir` with a test token and no ambient config.
#[allow(dead_code)]
pub fn pagesync_cmd(workdir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pagesync"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.current_dir(workdir);
    cmd.env("HOME", workdir);
    cmd.env("XDG_CONFIG_HOME", workdir.join(".config"));
    cmd.env("NOTION_TOKEN", "test-token");
    cmd.env_remove("NOTION_DATABASE_ID");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Write `pagesync.toml` pointing the source at `server`.
#[allow(dead_code)]
pub fn write_config(workdir: &Path, server: &MockServer) {
    let config = format!(
        r#"
[source]
database_id = "db1"
api_base = "{}/v1"

[retry]
base_delay_ms = 10
max_delay_ms = 10

[paths]
content_dir = "content"
static_dir = "static"
cache_file = ".pagesync-cache.json"
"#,
        server.uri()
    );
    std::fs::write(workdir.join("pagesync.toml"), config).unwrap();
}

#[allow(dead_code)]
pub fn page(id: &str, slug: &str, edited: &str) -> Value {
    json!({
        "object": "page",
        "id": id,
        "created_time": "2024-05-01T00:00:00.000Z",
        "last_edited_time": edited,
        "cover": null,
        "properties": {
            "Title": { "type": "title", "title": [{ "plain_text": format!("Post {slug}") }] },
            "Slug": { "type": "rich_text", "rich_text": [{ "plain_text": slug }] },
            "Date": { "type": "date", "date": { "start": "2024-05-01" } },
            "Tags": { "type": "multi_select", "multi_select": [{ "name": "notes" }] },
            "Published": { "type": "checkbox", "checkbox": true }
        }
    })
}

/// Mount a database listing returning `pages` in one response.
#[allow(dead_code)]
pub async fn mount_listing(server: &MockServer, pages: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/v1/databases/db1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": pages,
            "has_more": false,
            "next_cursor": null
        })))
        .mount(server)
        .await;
}

/// Mount the children of `block_id`.
#[allow(dead_code)]
pub async fn mount_children(server: &MockServer, block_id: &str, children: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/blocks/{block_id}/children")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": children,
            "has_more": false,
            "next_cursor": null
        })))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn paragraph(id: &str, text: &str) -> Value {
    json!({
        "id": id,
        "type": "paragraph",
        "has_children": false,
        "paragraph": { "rich_text": [{ "type": "text", "plain_text": text }] }
    })
}

#[allow(dead_code)]
pub fn external_image(id: &str, url: &str) -> Value {
    json!({
        "id": id,
        "type": "image",
        "has_children": false,
        "image": { "type": "external", "external": { "url": url }, "caption": [] }
    })
}
