//! Roast persistence.
//!
//! [`RoastStore`] saves finished roasts and lists the most recent ones for
//! the gallery. [`SupabaseStore`] talks to a PostgREST table over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::{ChookConfig, StorageConfig};
use crate::error::CoreError;
use crate::generation::RoastRequest;

/// A stored roast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoastRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub code_snippet: String,
    pub roast_markdown: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub detected_language: Option<String>,
}

/// A roast about to be stored. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoast {
    pub code_snippet: String,
    pub roast_markdown: String,
    pub context: Option<String>,
    pub detected_language: Option<String>,
}

impl NewRoast {
    /// Build a record from the inputs a roast was submitted with.
    ///
    /// The context note is stored exactly as submitted, blank or not.
    pub fn from_submission(submission: &RoastRequest, roast_markdown: &str) -> Self {
        let language = submission.detected_language.trim();
        Self {
            code_snippet: submission.source_text.clone(),
            roast_markdown: roast_markdown.to_owned(),
            context: Some(submission.context_note.clone()),
            detected_language: (!language.is_empty()).then(|| language.to_owned()),
        }
    }
}

/// Persistence for roast records.
#[async_trait]
pub trait RoastStore: Send + Sync {
    /// Insert one record.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Storage` with a user-facing message on failure.
    async fn save(&self, roast: &NewRoast) -> Result<(), CoreError>;

    /// Most recent records, newest first. Empty when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Storage` with a user-facing message on failure.
    async fn list_recent(&self, limit: usize) -> Result<Vec<RoastRecord>, CoreError>;
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: Option<String>,
}

/// [`RoastStore`] backed by a Supabase PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    config: StorageConfig,
}

impl SupabaseStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Build a store from the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when storage is not configured.
    pub fn from_config(config: &ChookConfig) -> Result<Self, CoreError> {
        Ok(Self::new(config.check_storage()?.clone()))
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url())
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<PostgrestError>(&body)
            .ok()
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body
                }
            });
        error!(%status, %message, "storage request rejected");
        Err(storage_error(message))
    }
}

fn storage_error(message: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(format!("Supabase error: {message}"))
}

#[async_trait]
impl RoastStore for SupabaseStore {
    #[instrument(skip_all, fields(table = %self.config.table))]
    async fn save(&self, roast: &NewRoast) -> Result<(), CoreError> {
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&[roast])
            .send()
            .await
            .map_err(storage_error)?;
        Self::check(response).await?;
        debug!("roast saved");
        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.config.table))]
    async fn list_recent(&self, limit: usize) -> Result<Vec<RoastRecord>, CoreError> {
        let limit = limit.to_string();
        let response = self
            .request(reqwest::Method::GET)
            .query(&[
                ("select", "*"),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(storage_error)?;
        let records: Vec<RoastRecord> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(storage_error)?;
        debug!(count = records.len(), "loaded recent roasts");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::test_support::{json_response, serve_once};

    fn store_for(addr: SocketAddr) -> SupabaseStore {
        SupabaseStore::new(
            StorageConfig::builder()
                .url(format!("http://{addr}/"))
                .anon_key("anon")
                .build(),
        )
    }

    fn submission(context: &str) -> RoastRequest {
        RoastRequest {
            source_text: "SELECT * FROM users".to_owned(),
            context_note: context.to_owned(),
            detected_language: "sql".to_owned(),
        }
    }

    #[test]
    fn test_should_store_blank_context_as_empty_string() {
        let roast = NewRoast::from_submission(&submission(""), "## Yàb");
        assert_eq!(roast.context.as_deref(), Some(""));
        assert_eq!(roast.detected_language.as_deref(), Some("sql"));

        let json = serde_json::to_value(&roast).expect("should serialize");
        assert_eq!(json["context"], "");
        assert_eq!(json["roast_markdown"], "## Yàb");
    }

    #[test]
    fn test_should_keep_context_as_submitted() {
        let roast = NewRoast::from_submission(&submission("  legacy report \n"), "x");
        assert_eq!(roast.context.as_deref(), Some("  legacy report \n"));
    }

    #[test]
    fn test_should_require_storage_config() {
        let err = SupabaseStore::from_config(&ChookConfig::builder().build()).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_should_insert_with_minimal_return() {
        let (addr, server) = serve_once(json_response("201 Created", "")).await;
        let store = store_for(addr);

        store
            .save(&NewRoast::from_submission(&submission("ctx"), "## Yàb"))
            .await
            .expect("should save");

        let raw = server.await.expect("server should finish");
        let lower = raw.to_ascii_lowercase();
        assert!(raw.starts_with("POST /rest/v1/roasts HTTP/1.1"));
        assert!(lower.contains("prefer: return=minimal"));
        assert!(lower.contains("apikey: anon"));
        assert!(lower.contains("authorization: bearer anon"));

        let body_start = raw.find("\r\n\r\n").expect("has body") + 4;
        let body: serde_json::Value =
            serde_json::from_str(&raw[body_start..]).expect("body should be json");
        assert_eq!(body[0]["code_snippet"], "SELECT * FROM users");
        assert_eq!(body[0]["context"], "ctx");
    }

    #[tokio::test]
    async fn test_should_report_service_message_on_failure() {
        let body = r#"{"message":"Invalid API key","hint":null}"#;
        let (addr, _server) = serve_once(json_response("401 Unauthorized", body)).await;
        let store = store_for(addr);

        let err = store
            .save(&NewRoast::from_submission(&submission(""), "x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Supabase error: Invalid API key");
    }

    #[tokio::test]
    async fn test_should_list_recent_newest_first() {
        let body = r#"[
            {"id":2,"created_at":"2025-01-02T10:00:00.123456+00:00","code_snippet":"b","roast_markdown":"rb","context":null,"detected_language":"go"},
            {"id":1,"created_at":"2025-01-01T10:00:00+00:00","code_snippet":"a","roast_markdown":"ra","context":"old","detected_language":null}
        ]"#;
        let (addr, server) = serve_once(json_response("200 OK", body)).await;
        let store = store_for(addr);

        let records = store.list_recent(10).await.expect("should list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 2);
        assert_eq!(records[0].detected_language.as_deref(), Some("go"));
        assert_eq!(records[1].context.as_deref(), Some("old"));
        assert!(records[0].created_at > records[1].created_at);

        let raw = server.await.expect("server should finish");
        let request_line = raw.lines().next().expect("has request line");
        assert!(request_line.starts_with("GET /rest/v1/roasts?"));
        assert!(request_line.contains("select=*") || request_line.contains("select=%2A"));
        assert!(request_line.contains("order=created_at.desc"));
        assert!(request_line.contains("limit=10"));
    }

    #[tokio::test]
    async fn test_should_return_empty_gallery() {
        let (addr, _server) = serve_once(json_response("200 OK", "[]")).await;
        let records = store_for(addr).list_recent(5).await.expect("should list");
        assert!(records.is_empty());
    }
}
