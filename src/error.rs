//! Operator-wide error type

use thiserror::Error;

use crate::aggregator::AggregatorError;
use crate::chain::rpc::RpcError;
use crate::chain::SubscriptionError;
use crate::config::ConfigurationError;
use crate::delegate::DelegateError;
use crate::identity::keystore::KeystoreError;
use crate::signer::SignerError;
use crate::types::OperatorAddress;

/// Top-level error surfaced by bootstrap and by the event loop.
///
/// Only startup failures, subscription exhaustion and auxiliary failures ever leave the
/// event loop; per-task failures are logged and counted instead.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Chain RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Delegate error: {0}")]
    Delegate(#[from] DelegateError),

    #[error("Signing error: {0}")]
    Signer(#[from] SignerError),

    #[error("Aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error(
        "operator {address} is not registered. Register the operator with the operator CLI before starting it"
    )]
    NotRegistered { address: OperatorAddress },

    #[error("operator {address} has no operator id on chain (registration incomplete?)")]
    OperatorIdUnresolved { address: OperatorAddress },

    #[error("gave up re-subscribing to new tasks after {attempts} consecutive failures: {last_error}")]
    SubscriptionExhausted {
        attempts: u32,
        last_error: SubscriptionError,
    },

    #[error("auxiliary subsystem '{subsystem}' failed: {reason}")]
    AuxiliaryFailure { subsystem: String, reason: String },
}

/// Result type alias for [`OperatorError`]
pub type Result<T> = std::result::Result<T, OperatorError>;
