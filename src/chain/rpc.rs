//! Chain node client: an alloy provider over HTTP.
//!
//! The provider is built from our own reqwest client so the configured request timeout and
//! user agent apply to every JSON-RPC call. No fillers are installed; the operator only
//! reads (`eth_blockNumber`, `eth_getLogs`, `eth_call`).

use alloy::primitives::Address;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::contracts::NewTaskCreated;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("invalid RPC url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("contract call {method} failed: {source}")]
    Contract {
        method: &'static str,
        #[source]
        source: alloy::contract::Error,
    },

    #[error("invalid response to {method}: {reason}")]
    InvalidResponse { method: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ChainClient {
    provider: RootProvider,
    url: Url,
}

impl ChainClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let invalid = |reason: String| RpcError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("avs-operator/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        let transport = Http::with_client(client, parsed.clone());
        let provider = RootProvider::new(RpcClient::new(transport, false));

        info!(url = %parsed, timeout_ms = timeout.as_millis() as u64, "Created chain RPC client");

        Ok(Self {
            provider,
            url: parsed,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|source| RpcError::Transport {
                method: "eth_blockNumber",
                source,
            })
    }

    /// `NewTaskCreated` logs emitted by `task_manager` in `from_block..=to_block`
    pub async fn task_logs(
        &self,
        task_manager: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, RpcError> {
        let filter = new_task_filter(task_manager, from_block, to_block);
        debug!(from_block, to_block, "Fetching task manager logs");
        self.provider
            .get_logs(&filter)
            .await
            .map_err(|source| RpcError::Transport {
                method: "eth_getLogs",
                source,
            })
    }
}

fn new_task_filter(task_manager: Address, from_block: u64, to_block: u64) -> Filter {
    Filter::new()
        .address(task_manager)
        .event_signature(NewTaskCreated::SIGNATURE_HASH)
        .from_block(from_block)
        .to_block(to_block)
}
