//! Status check transport.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::utf8_percent_encode;
use reqwest::Client;
use serde_json::Value;

use crate::config::TrackerConfig;
use crate::error::StatusCheckError;
use crate::job::request_key::COMPONENT;

/// Default connect timeout for status requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An HTTP answer from the status endpoint, whatever its code.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    pub http_status: u16,
    /// Parsed JSON body, `None` when empty or not JSON.
    pub body: Option<Value>,
}

impl StatusReply {
    pub fn new(http_status: u16, body: Option<Value>) -> Self {
        Self { http_status, body }
    }
}

/// Fetches the status of one preview. An `Err` means no HTTP answer was
/// obtained at all; every HTTP status code is an `Ok` reply.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn check(
        &self,
        preview_id: &str,
        status_token: &str,
    ) -> Result<StatusReply, StatusCheckError>;
}

/// `GET {endpoint}/{preview_id}?token={status_token}` over reqwest.
pub struct HttpStatusClient {
    client: Client,
    endpoint: String,
}

impl HttpStatusClient {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, StatusCheckError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build()
            .map_err(|e| StatusCheckError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self, StatusCheckError> {
        Self::new(&config.status_endpoint, config.request_timeout())
    }

    fn url_for(&self, preview_id: &str) -> String {
        let segment = utf8_percent_encode(preview_id, COMPONENT);
        format!("{}/{}", self.endpoint, segment)
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn check(
        &self,
        preview_id: &str,
        status_token: &str,
    ) -> Result<StatusReply, StatusCheckError> {
        let url = self.url_for(preview_id);
        log::debug!("Checking status of preview '{}'", preview_id);

        let response = self
            .client
            .get(&url)
            .query(&[("token", status_token)])
            .send()
            .await
            .map_err(|e| StatusCheckError::Transport {
                preview_id: preview_id.to_string(),
                source: e,
            })?;

        let http_status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| StatusCheckError::Transport {
                preview_id: preview_id.to_string(),
                source: e,
            })?;

        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::debug!(
                        "Status body for '{}' is not JSON ({}), ignoring it",
                        preview_id,
                        e
                    );
                    None
                }
            }
        };

        Ok(StatusReply { http_status, body })
    }
}
