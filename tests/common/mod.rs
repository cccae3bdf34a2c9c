//! Shared fixtures for the integration tests.
//!
//! - [`mocks`]: in-process collaborators for driving the event loop deterministically
//! - [`servers`]: axum fakes for the compute service, the aggregator and a chain node

#![allow(dead_code)]

pub mod mocks;
pub mod servers;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use avs_operator::identity::{IdentityContext, OperatorKeypair};
use avs_operator::types::{ClientId, OperatorAddress, OperatorId, TaskCreatedEvent};

pub const OPERATOR_ADDRESS: [u8; 20] = [0x86; 20];
pub const OPERATOR_ID: [u8; 32] = [0x05; 32];
pub const TASK_MANAGER: [u8; 20] = [0x22; 20];
pub const REGISTRY_COORDINATOR: [u8; 20] = [0x33; 20];

pub fn test_keypair() -> OperatorKeypair {
    OperatorKeypair::from_secret_bytes(&[7u8; 32]).expect("valid test scalar")
}

pub fn test_identity() -> Arc<IdentityContext> {
    Arc::new(IdentityContext::new(
        OperatorAddress::from(OPERATOR_ADDRESS),
        test_keypair(),
        OperatorId::from(OPERATOR_ID),
    ))
}

pub fn task_event(task_index: u32, client_id: u64, block_number: u64) -> TaskCreatedEvent {
    TaskCreatedEvent {
        task_index,
        client_id: ClientId::from(client_id),
        task_created_block: block_number.saturating_sub(1) as u32,
        quorum_numbers: vec![0],
        quorum_threshold_percentage: 67,
        block_number,
        log_index: 0,
    }
}

/// Await `future`, failing the test after five seconds
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for the operator")
}
