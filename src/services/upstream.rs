//! Upstream telemetry backend client
//!
//! External collaborator of the analytical core: the only contact point
//! is `post(url, headers, body) -> (status, body)`. The core never calls
//! this during analysis; it exists for callers that submit generated
//! queries or telemetry to the backend.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::UpstreamConfig;

/// Minimal posting interface to the telemetry backend
#[async_trait]
pub trait TelemetryBackend: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Value,
    ) -> Result<(u16, Value), UpstreamError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("API key is not configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP implementation over the configured GraphQL endpoint
pub struct TelemetryClient {
    http_client: Client,
    config: UpstreamConfig,
}

impl TelemetryClient {
    pub fn new(config: UpstreamConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .unwrap_or_default();
        Self { http_client, config }
    }

    /// Execute a GraphQL query against the configured endpoint
    pub async fn execute_graphql(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<(u16, Value), UpstreamError> {
        if self.config.api_key.is_empty() {
            return Err(UpstreamError::MissingApiKey);
        }

        let mut payload = json!({ "query": query });
        if let Some(variables) = variables {
            payload["variables"] = variables;
        }

        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("API-Key".to_string(), self.config.api_key.clone()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        let endpoint = self.config.endpoint();
        self.post(&endpoint, &headers, payload).await
    }
}

#[async_trait]
impl TelemetryBackend for TelemetryClient {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Value,
    ) -> Result<(u16, Value), UpstreamError> {
        let mut request = self.http_client.post(url).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        tracing::debug!("Posting to telemetry backend: {}", url);
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}
