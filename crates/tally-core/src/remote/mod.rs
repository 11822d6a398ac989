//! Remote API abstraction and its HTTP implementation.
//!
//! The orchestrator drains the queue against [`RemoteApi`]; the REST shape
//! is one collection per entity kind with POST for creates and PUT for
//! updates, keyed by server id.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::EntityKind;
use crate::util::compact_text;

/// Identity assigned by the remote system when it accepts a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: i64,
}

/// Request/response surface of the remote system.
#[allow(async_fn_in_trait)]
pub trait RemoteApi {
    /// Create a record; returns the server-assigned identity.
    async fn create(&self, kind: EntityKind, payload: &serde_json::Value)
        -> Result<RemoteRecord>;

    /// Update a record by server id.
    async fn update(
        &self,
        kind: EntityKind,
        server_id: i64,
        payload: &serde_json::Value,
    ) -> Result<RemoteRecord>;

    /// Cheap reachability probe used by the connectivity monitor.
    async fn ping(&self) -> Result<()>;
}

/// HTTP implementation of [`RemoteApi`].
#[derive(Clone)]
pub struct HttpRemoteApi {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    /// Build a client for the given endpoint configuration.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_for_record(&self, builder: reqwest::RequestBuilder) -> Result<RemoteRecord> {
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteRejected {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        let body = response.json::<RemoteRecordBody>().await?;
        Ok(RemoteRecord { id: body.id })
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn create(
        &self,
        kind: EntityKind,
        payload: &serde_json::Value,
    ) -> Result<RemoteRecord> {
        let url = format!("{}/v1/{}", self.config.base_url, kind.collection());
        let request = self.authorized(self.client.post(&url)).json(payload);
        self.send_for_record(request).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        server_id: i64,
        payload: &serde_json::Value,
    ) -> Result<RemoteRecord> {
        let url = format!(
            "{}/v1/{}/{server_id}",
            self.config.base_url,
            kind.collection()
        );
        let request = self.authorized(self.client.put(&url)).json(payload);
        self.send_for_record(request).await
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/v1/health", self.config.base_url);
        let response = self.authorized(self.client.get(&url)).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::RemoteRejected {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteRecordBody {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RemoteErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_error_prefers_message_field() {
        let body = r#"{"message": "  project not found  "}"#;
        assert_eq!(
            parse_api_error(StatusCode::NOT_FOUND, body),
            "project not found"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_error_field() {
        let body = r#"{"error": "unauthorized"}"#;
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, body),
            "unauthorized"
        );
    }

    #[test]
    fn parse_api_error_uses_raw_body_or_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream exploded"),
            "upstream exploded"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn create_and_update_urls_follow_rest_shape() {
        let config = RemoteConfig::new("https://api.example.com").unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        // Collections mirror table names
        assert_eq!(EntityKind::TimeEntry.collection(), "time_entries");
        assert_eq!(EntityKind::Task.collection(), "tasks");
        assert_eq!(EntityKind::Project.collection(), "projects");
    }
}
