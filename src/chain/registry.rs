//! Registration queries against the registry coordinator contract.

use alloy::primitives::Address;
use async_trait::async_trait;
use tracing::debug;

use super::contracts::IRegistryCoordinator;
use super::rpc::{ChainClient, RpcError};
use super::OperatorRegistry;
use crate::types::{OperatorAddress, OperatorId};

/// `RegistryCoordinator.OperatorStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorStatus {
    NeverRegistered,
    Registered,
    Deregistered,
}

impl TryFrom<u8> for OperatorStatus {
    type Error = RpcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NeverRegistered),
            1 => Ok(Self::Registered),
            2 => Ok(Self::Deregistered),
            other => Err(RpcError::InvalidResponse {
                method: "getOperatorStatus",
                reason: format!("unknown operator status {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcOperatorRegistry {
    client: ChainClient,
    registry_coordinator: Address,
}

impl RpcOperatorRegistry {
    pub fn new(client: ChainClient, registry_coordinator: Address) -> Self {
        Self {
            client,
            registry_coordinator,
        }
    }

    pub async fn operator_status(
        &self,
        address: &OperatorAddress,
    ) -> Result<OperatorStatus, RpcError> {
        let coordinator =
            IRegistryCoordinator::new(self.registry_coordinator, self.client.provider().clone());
        let status = coordinator
            .getOperatorStatus(*address)
            .call()
            .await
            .map_err(|source| RpcError::Contract {
                method: "getOperatorStatus",
                source,
            })?
            .status;
        OperatorStatus::try_from(status)
    }
}

#[async_trait]
impl OperatorRegistry for RpcOperatorRegistry {
    async fn is_operator_registered(&self, address: &OperatorAddress) -> Result<bool, RpcError> {
        let status = self.operator_status(address).await?;
        debug!(operator_address = %address, ?status, "Fetched operator status");
        Ok(status == OperatorStatus::Registered)
    }

    async fn operator_id(&self, address: &OperatorAddress) -> Result<OperatorId, RpcError> {
        let coordinator =
            IRegistryCoordinator::new(self.registry_coordinator, self.client.provider().clone());
        let operator_id = coordinator
            .getOperatorId(*address)
            .call()
            .await
            .map_err(|source| RpcError::Contract {
                method: "getOperatorId",
                source,
            })?
            .operatorId;
        Ok(operator_id)
    }
}
