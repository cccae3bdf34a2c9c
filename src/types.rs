//! # Core Data Types
//!
//! Records that flow through the operator: the chain's `NewTaskCreated` event, the task
//! response the operator attests to, and the signed envelope delivered to the aggregator.
//! Chain identifiers are alloy primitives, so they render and parse as `0x` hex and the
//! client id (a `uint256`) renders as decimal.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

pub use crate::identity::bls::BlsSignature as TaskSignature;

/// Monotonic on-chain task identifier
pub type TaskIndex = u32;

/// Account address of the operator
pub type OperatorAddress = Address;

/// Identifier the registry coordinator assigns at registration
pub type OperatorId = B256;

/// Opaque numeric handle of the client that requested the computation
pub type ClientId = U256;

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&alloy::hex::encode_prefixed(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        alloy::hex::decode(&value).map_err(de::Error::custom)
    }
}

/// `NewTaskCreated` as observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedEvent {
    pub task_index: TaskIndex,
    pub client_id: ClientId,
    /// Block the task manager recorded as the task's creation block
    pub task_created_block: u32,
    #[serde(with = "hex_bytes")]
    pub quorum_numbers: Vec<u8>,
    pub quorum_threshold_percentage: u32,
    /// Block that carried the event log; drives subscription resumption
    pub block_number: u64,
    pub log_index: u64,
}

/// The operator's result for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub reference_task_index: TaskIndex,
    pub payload: String,
}

impl TaskResponse {
    pub fn new(reference_task_index: TaskIndex, payload: impl Into<String>) -> Self {
        Self {
            reference_task_index,
            payload: payload.into(),
        }
    }
}

/// A task response plus the operator's signature over its digest.
///
/// Only the response signer builds these; see [`crate::signer::ResponseSigner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTaskResponse {
    task_response: TaskResponse,
    signature: TaskSignature,
    operator_id: OperatorId,
}

impl SignedTaskResponse {
    pub(crate) fn new(
        task_response: TaskResponse,
        signature: TaskSignature,
        operator_id: OperatorId,
    ) -> Self {
        Self {
            task_response,
            signature,
            operator_id,
        }
    }

    pub fn task_response(&self) -> &TaskResponse {
        &self.task_response
    }

    pub fn task_index(&self) -> TaskIndex {
        self.task_response.reference_task_index
    }

    pub fn signature(&self) -> &TaskSignature {
        &self.signature
    }

    pub fn operator_id(&self) -> &OperatorId {
        &self.operator_id
    }
}
