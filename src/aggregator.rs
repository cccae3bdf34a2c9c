//! # Aggregator Client
//!
//! Delivery of signed task responses to the aggregator. [`AggregatorClient`] is one
//! best-effort call; [`AggregatorDispatcher`] detaches each delivery onto its own tokio
//! task so a slow aggregator never stalls the event loop. Nothing is retried locally and
//! outcomes only reach the logs and [`OperatorStats`].

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::operator::stats::OperatorStats;
use crate::types::SignedTaskResponse;

/// JSON-RPC method exposed by the aggregator
pub const PROCESS_SIGNED_TASK_RESPONSE: &str = "Aggregator.ProcessSignedTaskResponse";

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("invalid aggregator url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("aggregator unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("aggregator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("aggregator rejected response ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed aggregator reply: {0}")]
    MalformedReply(String),
}

/// Sends one signed response to the aggregator
#[async_trait]
pub trait AggregatorClient: Send + Sync {
    async fn deliver(&self, response: &SignedTaskResponse) -> Result<(), AggregatorError>;
}

#[derive(Debug, Serialize)]
struct AggregatorRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [&'a SignedTaskResponse; 1],
}

#[derive(Debug, Deserialize)]
struct AggregatorReply {
    #[serde(default)]
    error: Option<AggregatorReplyError>,
    #[serde(default)]
    #[allow(dead_code)]
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AggregatorReplyError {
    code: i64,
    message: String,
}

/// [`AggregatorClient`] speaking JSON-RPC 2.0 over HTTP
#[derive(Debug)]
pub struct JsonRpcAggregatorClient {
    client: Client,
    url: Url,
    next_id: AtomicU64,
}

impl JsonRpcAggregatorClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AggregatorError> {
        let invalid = |reason: String| AggregatorError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("avs-operator/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| invalid(format!("failed to create HTTP client: {e}")))?;

        info!(url = %parsed, timeout_ms = timeout.as_millis() as u64, "Created aggregator client");

        Ok(Self {
            client,
            url: parsed,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl AggregatorClient for JsonRpcAggregatorClient {
    async fn deliver(&self, response: &SignedTaskResponse) -> Result<(), AggregatorError> {
        let request = AggregatorRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: PROCESS_SIGNED_TASK_RESPONSE,
            params: [response],
        };

        let reply = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(AggregatorError::Transport)?;

        let status = reply.status();
        if !status.is_success() {
            let body = reply
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AggregatorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = reply.bytes().await.map_err(AggregatorError::Transport)?;
        // an empty 2xx body is treated as "call completed"
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let reply: AggregatorReply = serde_json::from_slice(&body)
            .map_err(|e| AggregatorError::MalformedReply(e.to_string()))?;
        if let Some(error) = reply.error {
            return Err(AggregatorError::Rejected {
                code: error.code,
                message: error.message,
            });
        }
        Ok(())
    }
}

/// Fire-and-forget delivery of signed responses.
///
/// `dispatch` never waits: the network call runs on a spawned task. With a limit set, a
/// semaphore caps concurrent calls; queued deliveries wait inside their own task.
#[derive(Clone)]
pub struct AggregatorDispatcher {
    client: Arc<dyn AggregatorClient>,
    limiter: Option<Arc<Semaphore>>,
    stats: Arc<OperatorStats>,
}

impl std::fmt::Debug for AggregatorDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorDispatcher")
            .field(
                "available_permits",
                &self.limiter.as_ref().map(|l| l.available_permits()),
            )
            .finish()
    }
}

impl AggregatorDispatcher {
    pub fn new(
        client: Arc<dyn AggregatorClient>,
        max_in_flight: Option<usize>,
        stats: Arc<OperatorStats>,
    ) -> Self {
        Self {
            client,
            limiter: max_in_flight.map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            stats,
        }
    }

    /// Start delivering `response` in the background.
    ///
    /// The handle is returned for tests and shutdown draining; the event loop drops it.
    pub fn dispatch(&self, response: SignedTaskResponse) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let limiter = self.limiter.clone();
        let stats = Arc::clone(&self.stats);
        stats.record_dispatched();

        tokio::spawn(async move {
            let task_index = response.task_index();
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(task_index, "Aggregator limiter closed, dropping delivery");
                        stats.record_delivery_failure();
                        return;
                    }
                },
                None => None,
            };

            debug!(task_index, "Sending signed task response to aggregator");
            match client.deliver(&response).await {
                Ok(()) => {
                    stats.record_delivered();
                    info!(task_index, "Delivered signed task response to aggregator");
                }
                Err(e) => {
                    stats.record_delivery_failure();
                    error!(task_index, error = %e, "Failed to deliver signed task response");
                }
            }
        })
    }
}
