//! Notion task store.
//!
//! Each task becomes a page in the configured database with a title
//! property, an optional status select, and body blocks for the summary,
//! the steps and a link back to Slack.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::task::{NewTask, TaskId, TaskStore};
use crate::config::NotionConfig;
use crate::{AppError, Result};

const NOTION_BASE_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Notion rejects rich-text segments longer than this.
const MAX_TEXT_CHARS: usize = 2000;

#[derive(Deserialize)]
struct PageCreated {
    id: String,
}

fn rich_text(content: &str) -> Value {
    let content: String = content.chars().take(MAX_TEXT_CHARS).collect();
    json!([{ "type": "text", "text": { "content": content } }])
}

fn heading(text: &str) -> Value {
    json!({ "object": "block", "type": "heading_2", "heading_2": { "rich_text": rich_text(text) } })
}

fn paragraph(text: &str) -> Value {
    json!({ "object": "block", "type": "paragraph", "paragraph": { "rich_text": rich_text(text) } })
}

fn bullet(text: &str) -> Value {
    json!({
        "object": "block",
        "type": "bulleted_list_item",
        "bulleted_list_item": { "rich_text": rich_text(text) }
    })
}

fn link_paragraph(label: &str, url: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": [
            { "type": "text", "text": { "content": label }, "annotations": { "bold": true } },
            { "type": "text", "text": { "content": url, "link": { "url": url } } }
        ] }
    })
}

/// Client for the Notion pages API.
pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    database_id: String,
    title_property: String,
    status: Option<(String, String)>,
}

impl NotionClient {
    /// Create a client from Notion configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Notion` if the HTTP client cannot be constructed.
    pub fn new(config: &NotionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Notion(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| NOTION_BASE_URL.to_owned()),
            api_key: config.api_key.clone(),
            database_id: config.database_id.clone(),
            title_property: config.title_property.clone(),
            status: config
                .status_property
                .clone()
                .zip(config.status_value.clone()),
        })
    }

    /// Request body for `POST /v1/pages`.
    #[must_use]
    pub fn page_body(&self, task: &NewTask) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(
            self.title_property.clone(),
            json!({ "title": rich_text(&task.title) }),
        );
        if let Some((property, value)) = &self.status {
            properties.insert(property.clone(), json!({ "select": { "name": value } }));
        }

        let mut children = vec![heading("Summary"), paragraph(&task.description)];
        if !task.steps.is_empty() {
            children.push(heading("Steps"));
            children.extend(task.steps.iter().map(|step| bullet(step)));
        }
        if let Some(url) = task.source_url.as_deref() {
            children.push(heading("References"));
            children.push(link_paragraph("Slack thread: ", url));
        }

        json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
            "children": children,
        })
    }

    async fn create_page(&self, task: &NewTask) -> Result<TaskId> {
        let url = format!("{}/v1/pages", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&self.page_body(task))
            .send()
            .await
            .map_err(|err| AppError::Notion(format!("create page request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(AppError::Notion(format!("create page returned {status}: {body}")));
        }
        let page: PageCreated = response
            .json()
            .await
            .map_err(|err| AppError::Notion(format!("create page response unreadable: {err}")))?;
        Ok(TaskId(page.id))
    }
}

impl TaskStore for NotionClient {
    fn create_task(
        &self,
        task: NewTask,
    ) -> Pin<Box<dyn Future<Output = Result<TaskId>> + Send + '_>> {
        Box::pin(async move { self.create_page(&task).await })
    }
}
