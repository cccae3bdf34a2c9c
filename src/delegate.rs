//! # Task Delegate Client
//!
//! Bridge to the external compute service. One task maps to one `POST` with a
//! `multipart/form-data` body whose only field is `client_id`; the full response body is
//! the task result.
//!
//! Every failure mode is reported as a distinct [`DelegateError`] so the event loop can
//! skip the task instead of attesting to a result that was never produced.

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::ClientId;

/// Form field carrying the client identifier
pub const CLIENT_ID_FIELD: &str = "client_id";

#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("delegate service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("delegate service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read delegate response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("delegate service returned an empty payload")]
    EmptyPayload,

    #[error("invalid delegate url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl DelegateError {
    /// `true` when the service could not be reached at all, as opposed to answering badly
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DelegateError::Unreachable(_))
    }
}

/// Runs the off-chain computation for a task
#[async_trait]
pub trait TaskDelegate: Send + Sync {
    async fn process(&self, client_id: &ClientId) -> Result<String, DelegateError>;
}

/// Configuration for [`HttpTaskDelegate`]
#[derive(Debug, Clone)]
pub struct HttpDelegateConfig {
    /// Endpoint receiving the multipart form (e.g. "<http://localhost:8000/run_fhe>")
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Accept an empty response body as a valid result
    pub allow_empty_payload: bool,
}

impl Default for HttpDelegateConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/run_fhe".to_string(),
            timeout_ms: 120_000,
            allow_empty_payload: false,
        }
    }
}

/// [`TaskDelegate`] that talks to the compute service over HTTP
pub struct HttpTaskDelegate {
    client: Client,
    url: Url,
    config: HttpDelegateConfig,
}

impl std::fmt::Debug for HttpTaskDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTaskDelegate")
            .field("url", &self.url.as_str())
            .field("timeout_ms", &self.config.timeout_ms)
            .field("allow_empty_payload", &self.config.allow_empty_payload)
            .finish()
    }
}

impl HttpTaskDelegate {
    pub fn new(config: HttpDelegateConfig) -> Result<Self, DelegateError> {
        let invalid = |reason: String| DelegateError::InvalidUrl {
            url: config.url.clone(),
            reason,
        };
        let url = Url::parse(&config.url).map_err(|e| invalid(e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("avs-operator/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| invalid(format!("failed to create HTTP client: {e}")))?;

        info!(
            url = %url,
            timeout_ms = config.timeout_ms,
            "Created task delegate client"
        );

        Ok(Self {
            client,
            url,
            config,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TaskDelegate for HttpTaskDelegate {
    async fn process(&self, client_id: &ClientId) -> Result<String, DelegateError> {
        let form = Form::new().text(CLIENT_ID_FIELD, client_id.to_string());

        debug!(client_id = %client_id, url = %self.url, "Calling task delegate");

        let response = self
            .client
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(DelegateError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(client_id = %client_id, status = %status, body = %body, "Task delegate rejected request");
            return Err(DelegateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload = response.text().await.map_err(DelegateError::Body)?;
        if payload.is_empty() && !self.config.allow_empty_payload {
            return Err(DelegateError::EmptyPayload);
        }

        debug!(
            client_id = %client_id,
            payload_len = payload.len(),
            "Task delegate returned payload"
        );
        Ok(payload)
    }
}
