//! Google Calendar v3 backend.
//!
//! Event inserts go through the batch endpoint as one `multipart/mixed`
//! request; every part carries a `Content-ID` that Google echoes back as
//! `response-<id>`, so outcomes are matched by id and never by position.

use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use reqwest::{Client, StatusCode, Url, header};
use serde::Deserialize;
use uuid::Uuid;

use super::{CalendarService, EventBatch, ItemOutcome};
use crate::{Error, Result, SubmitError};

const API_ROOT: &str = "https://www.googleapis.com/calendar/v3";
const BATCH_URL: &str = "https://www.googleapis.com/batch/calendar/v3";
const SERVICE_NAME: &str = "google";
/// Calendar list colour ids accepted by the API
const CALENDAR_COLOR_IDS: std::ops::RangeInclusive<u8> = 1..=24;

static BOUNDARY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)boundary="?([^";]+)"?"#).expect("boundary pattern is a valid regex")
});
static CONTENT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^content-id:\s*<response-([^>]+)>").expect("content-id pattern is a valid regex")
});
static STATUS_LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^HTTP/\d(?:\.\d)?\s+(\d{3})[ \t]*([^\r\n]*)")
        .expect("status line pattern is a valid regex")
});

#[derive(Debug, Deserialize)]
struct CalendarListPage {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct CreatedCalendar {
    id: String,
}

pub struct GoogleCalendarClient {
    client: Client,
    access_token: String,
    api_root: String,
    batch_url: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_endpoints(access_token, API_ROOT, BATCH_URL)
    }

    pub fn with_endpoints(
        access_token: impl Into<String>,
        api_root: impl Into<String>,
        batch_url: impl Into<String>,
    ) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::Config("Google access token is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("UVSQ-Agenda-Rust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_token,
            api_root: api_root.into(),
            batch_url: batch_url.into(),
        })
    }

    fn api_error(message: impl Into<String>) -> Error {
        Error::Calendar {
            service: SERVICE_NAME.to_string(),
            message: message.into(),
        }
    }

    /// `{api_root}/<segments>` with every segment percent-encoded
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_root)
            .map_err(|e| Error::Config(format!("Invalid Google API root: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config("Google API root cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::api_error(format!(
            "{action} failed: {}",
            describe_failure(status.as_u16(), status.canonical_reason().unwrap_or(""), &body)
        )))
    }

    async fn find_calendar(&self, summary: &str) -> Result<Option<String>> {
        let url = self.api_url(&["users", "me", "calendarList"])?;
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(url.clone())
                .bearer_auth(&self.access_token)
                .query(&[("minAccessRole", "owner")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = Self::check(request.send().await?, "Listing calendars").await?;
            let page: CalendarListPage = response.json().await?;

            if let Some(entry) = page.items.into_iter().find(|entry| entry.summary == summary) {
                return Ok(Some(entry.id));
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    }

    async fn create_calendar(&self, summary: &str, time_zone: &str) -> Result<String> {
        let url = self.api_url(&["calendars"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "summary": summary, "timeZone": time_zone }))
            .send()
            .await?;
        let created: CreatedCalendar = Self::check(response, "Creating calendar")
            .await?
            .json()
            .await?;
        Ok(created.id)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn ensure_calendar(&self, summary: &str, time_zone: &str) -> Result<String> {
        if let Some(id) = self.find_calendar(summary).await? {
            tracing::info!("Reusing calendar '{}' ({})", summary, id);
            return Ok(id);
        }
        let id = self.create_calendar(summary, time_zone).await?;
        tracing::info!("Created calendar '{}' ({})", summary, id);
        Ok(id)
    }

    async fn execute_batch(
        &self,
        calendar_id: &str,
        batch: &EventBatch,
    ) -> std::result::Result<Vec<ItemOutcome>, SubmitError> {
        let events_url = self
            .api_url(&["calendars", calendar_id, "events"])
            .map_err(|e| SubmitError::DispatchFailure(e.to_string()))?;
        let boundary = format!("batch_{}", Uuid::new_v4().simple());
        let body = build_batch_body(&boundary, events_url.path(), batch)?;

        tracing::debug!(
            "Dispatching batch of {} inserts to {}",
            batch.len(),
            self.batch_url
        );
        let response = self
            .client
            .post(&self.batch_url)
            .bearer_auth(&self.access_token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/mixed; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| SubmitError::DispatchFailure(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::DispatchFailure(e.to_string()))?;

        if !status.is_success() {
            return Err(SubmitError::DispatchFailure(describe_failure(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
                &text,
            )));
        }
        parse_batch_response(&content_type, &text)
    }

    async fn randomize_color(&self, calendar_id: &str) -> Result<()> {
        let color_id = random_color_id();
        let url = self.api_url(&["users", "me", "calendarList", calendar_id])?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "colorId": color_id.to_string() }))
            .send()
            .await?;
        Self::check(response, "Setting calendar colour").await?;
        tracing::debug!("Calendar {} now uses colour {}", calendar_id, color_id);
        Ok(())
    }
}

fn random_color_id() -> u8 {
    rand::rng().random_range(CALENDAR_COLOR_IDS)
}

/// Serialise `batch` as a `multipart/mixed` body of event inserts to `events_path`.
pub fn build_batch_body(
    boundary: &str,
    events_path: &str,
    batch: &EventBatch,
) -> std::result::Result<String, SubmitError> {
    let mut body = String::new();
    for item in batch.items() {
        let json = serde_json::to_string(&item.payload)
            .map_err(|e| SubmitError::DispatchFailure(format!("Failed to encode {}: {e}", item.id)))?;
        body.push_str(&format!("--{boundary}\r\n"));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <{}>\r\n\r\n", item.id));
        body.push_str(&format!("POST {events_path} HTTP/1.1\r\n"));
        body.push_str("Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.push_str(&json);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    Ok(body)
}

/// Split a batch response into per-item outcomes, keyed by `Content-ID`.
pub fn parse_batch_response(
    content_type: &str,
    body: &str,
) -> std::result::Result<Vec<ItemOutcome>, SubmitError> {
    let boundary = BOUNDARY_PATTERN
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .ok_or_else(|| {
            SubmitError::DispatchFailure(format!(
                "Batch response is not multipart: '{content_type}'"
            ))
        })?;

    let delimiter = format!("--{boundary}");
    let mut outcomes = Vec::new();
    for part in body.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let Some(id) = CONTENT_ID_PATTERN
            .captures(part)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            tracing::debug!("Skipping batch part without Content-ID");
            continue;
        };
        let Some(status) = STATUS_LINE_PATTERN.captures(part) else {
            outcomes.push(ItemOutcome::failed(id, "Missing HTTP status in batch part"));
            continue;
        };
        let code: u16 = status[1].parse().unwrap_or(0);
        let reason = status.get(2).map_or("", |m| m.as_str().trim());
        let end_of_status = status.get(0).map_or(0, |m| m.end());

        if StatusCode::from_u16(code).is_ok_and(|s| s.is_success()) {
            outcomes.push(ItemOutcome::created(id));
        } else {
            let inner_body = split_headers(&part[end_of_status..]);
            outcomes.push(ItemOutcome::failed(
                id,
                describe_failure(code, reason, inner_body),
            ));
        }
    }
    Ok(outcomes)
}

/// Body of an HTTP message, after the first blank line
fn split_headers(message: &str) -> &str {
    message
        .find("\r\n\r\n")
        .map(|i| &message[i + 4..])
        .or_else(|| message.find("\n\n").map(|i| &message[i + 2..]))
        .unwrap_or("")
        .trim()
}

/// `"<code> <reason>: <google error message>"`
fn describe_failure(code: u16, reason: &str, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body.trim())
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    let head = if reason.is_empty() {
        code.to_string()
    } else {
        format!("{code} {reason}")
    };
    match message {
        Some(message) => format!("{head}: {message}"),
        None => head,
    }
}
