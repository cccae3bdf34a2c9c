//! # Operator Configuration System
//!
//! Typed configuration for the operator daemon, loaded by [`ConfigManager`] from a TOML file
//! with an optional per-environment override file and `OPERATOR_<SECTION>__<KEY>`
//! environment variables on top.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use avs_operator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment auto-detected from OPERATOR_ENV / APP_ENV
//! let manager = ConfigManager::load_from_path("config/operator.toml")?;
//!
//! let delegate_url = &manager.config().delegate.url;
//! let poll_interval = manager.config().chain.poll_interval();
//! # Ok(())
//! # }
//! ```
//!
//! ## Example
//!
//! ```toml
//! [operator]
//! address = "0x860b6912c2d0337ef05bbc89b0c2cb6cbaeab4a5"
//! signing_key_path = "keys/operator.key.json"
//!
//! [chain]
//! rpc_url = "http://localhost:8545"
//! registry_coordinator_address = "0x..."
//! task_manager_address = "0x..."
//!
//! [aggregator]
//! url = "http://localhost:8090"
//! ```

pub mod error;
pub mod loader;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::chain::subscriber::PollingSubscriberConfig;
use crate::delegate::HttpDelegateConfig;
use crate::signer::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::subscription::ResubscribePolicy;
use crate::types::OperatorAddress;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub operator: OperatorSection,
    pub chain: ChainConfig,
    #[serde(default)]
    pub delegate: DelegateConfig,
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Operator identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSection {
    /// Operator account address (20-byte hex)
    pub address: String,
    /// Encrypted keystore holding the signing key
    pub signing_key_path: PathBuf,
    /// Environment variable that holds the keystore password
    #[serde(default = "default_password_env")]
    pub signing_key_password_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub registry_coordinator_address: String,
    pub task_manager_address: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on the block span of one `eth_getLogs` query
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    #[serde(default = "default_delegate_url")]
    pub url: String,
    #[serde(default = "default_delegate_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub allow_empty_payload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub url: String,
    #[serde(default = "default_aggregator_timeout_ms")]
    pub timeout_ms: u64,
    /// Bound on concurrent deliveries; unbounded when absent
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Consecutive failed subscribe attempts before the operator stops; unbounded when absent
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Feed uptime after which a failure no longer counts towards the backoff
    #[serde(default = "default_healthy_after_ms")]
    pub healthy_after_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Period of the stats reporter; disabled when absent
    #[serde(default)]
    pub stats_interval_secs: Option<u64>,
}

fn default_password_env() -> String {
    "OPERATOR_SIGNING_KEY_PASSWORD".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_block_range() -> u64 {
    1_000
}

fn default_delegate_url() -> String {
    HttpDelegateConfig::default().url
}

fn default_delegate_timeout_ms() -> u64 {
    HttpDelegateConfig::default().timeout_ms
}

fn default_aggregator_timeout_ms() -> u64 {
    10_000
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_event_buffer_size() -> usize {
    256
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_healthy_after_ms() -> u64 {
    30_000
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            url: default_delegate_url(),
            timeout_ms: default_delegate_timeout_ms(),
            allow_empty_payload: false,
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: None,
            healthy_after_ms: default_healthy_after_ms(),
        }
    }
}

fn parse_address(field: &str, value: &str) -> ConfigResult<Address> {
    value
        .parse()
        .map_err(|e| ConfigurationError::invalid_value(field, value, format!("{e}")))
}

fn require_non_empty(field: &str, value: &str, context: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::missing_required_field(field, context));
    }
    Ok(())
}

impl OperatorConfig {
    /// Reject values that would only fail later, at runtime
    pub fn validate(&self) -> ConfigResult<()> {
        self.operator.operator_address()?;
        require_non_empty(
            "operator.signing_key_password_env",
            &self.operator.signing_key_password_env,
            "operator",
        )?;

        require_non_empty("chain.rpc_url", &self.chain.rpc_url, "chain")?;
        self.chain.registry_coordinator()?;
        self.chain.task_manager()?;
        if self.chain.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "chain.poll_interval_ms",
                "0",
                "must be greater than zero",
            ));
        }
        if self.chain.max_block_range == 0 {
            return Err(ConfigurationError::invalid_value(
                "chain.max_block_range",
                "0",
                "must be greater than zero",
            ));
        }

        require_non_empty("delegate.url", &self.delegate.url, "delegate")?;
        require_non_empty("aggregator.url", &self.aggregator.url, "aggregator")?;
        if self.aggregator.max_in_flight == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "aggregator.max_in_flight",
                "0",
                "must be greater than zero when set",
            ));
        }

        let subscription = &self.subscription;
        if subscription.event_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "subscription.event_buffer_size",
                "0",
                "must be greater than zero",
            ));
        }
        if subscription.backoff_multiplier.is_nan() || subscription.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "subscription.backoff_multiplier",
                subscription.backoff_multiplier.to_string(),
                "must be at least 1.0",
            ));
        }
        if subscription.initial_backoff_ms > subscription.max_backoff_ms {
            return Err(ConfigurationError::invalid_value(
                "subscription.initial_backoff_ms",
                subscription.initial_backoff_ms.to_string(),
                format!(
                    "must not exceed subscription.max_backoff_ms ({})",
                    subscription.max_backoff_ms
                ),
            ));
        }
        if subscription.max_attempts == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "subscription.max_attempts",
                "0",
                "must be greater than zero when set",
            ));
        }

        if self.health.stats_interval_secs == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "health.stats_interval_secs",
                "0",
                "must be greater than zero when set",
            ));
        }

        Ok(())
    }
}

impl OperatorSection {
    pub fn operator_address(&self) -> ConfigResult<OperatorAddress> {
        parse_address("operator.address", &self.address)
    }
}

impl ChainConfig {
    pub fn registry_coordinator(&self) -> ConfigResult<Address> {
        parse_address(
            "chain.registry_coordinator_address",
            &self.registry_coordinator_address,
        )
    }

    pub fn task_manager(&self) -> ConfigResult<Address> {
        parse_address("chain.task_manager_address", &self.task_manager_address)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn subscriber_config(&self, event_buffer_size: usize) -> PollingSubscriberConfig {
        PollingSubscriberConfig {
            poll_interval: self.poll_interval(),
            max_block_range: self.max_block_range,
            event_buffer_size,
        }
    }
}

impl DelegateConfig {
    pub fn http_config(&self) -> HttpDelegateConfig {
        HttpDelegateConfig {
            url: self.url.clone(),
            timeout_ms: self.timeout_ms,
            allow_empty_payload: self.allow_empty_payload,
        }
    }
}

impl AggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SubscriptionConfig {
    pub fn resubscribe_policy(&self) -> ResubscribePolicy {
        ResubscribePolicy {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_attempts: self.max_attempts,
            healthy_after: Duration::from_millis(self.healthy_after_ms),
        }
    }
}
