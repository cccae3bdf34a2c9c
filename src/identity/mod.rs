//! # Operator Identity
//!
//! The [`IdentityContext`] bundles everything that identifies this operator to the network:
//! its account address, its BLS keypair on BN254 and the operator id the registry coordinator
//! assigned during registration. It is built once during bootstrap and shared read-only
//! (`Arc<IdentityContext>`) by every component that signs or attributes responses.

pub mod bls;
pub mod keystore;

use tracing::info;

use crate::chain::OperatorRegistry;
use crate::error::{OperatorError, Result};
use crate::types::{OperatorAddress, OperatorId};
pub use bls::{BlsKeyPair as OperatorKeypair, BlsPublicKey};

/// Immutable operator identity
#[derive(Debug)]
pub struct IdentityContext {
    operator_address: OperatorAddress,
    keypair: OperatorKeypair,
    operator_id: OperatorId,
}

impl IdentityContext {
    pub fn new(
        operator_address: OperatorAddress,
        keypair: OperatorKeypair,
        operator_id: OperatorId,
    ) -> Self {
        Self {
            operator_address,
            keypair,
            operator_id,
        }
    }

    /// Resolve the operator id from the registry and build the context.
    ///
    /// The id only exists after registration, so an all-zero id is reported as a startup
    /// failure instead of being used to sign responses nobody can attribute.
    pub async fn resolve(
        operator_address: OperatorAddress,
        keypair: OperatorKeypair,
        registry: &dyn OperatorRegistry,
    ) -> Result<Self> {
        let operator_id = registry.operator_id(&operator_address).await?;
        if operator_id.is_zero() {
            return Err(OperatorError::OperatorIdUnresolved {
                address: operator_address,
            });
        }

        info!(
            operator_id = %operator_id,
            operator_address = %operator_address,
            public_key = %keypair.public_key(),
            "Operator info"
        );

        Ok(Self::new(operator_address, keypair, operator_id))
    }

    pub fn operator_address(&self) -> &OperatorAddress {
        &self.operator_address
    }

    pub fn operator_id(&self) -> &OperatorId {
        &self.operator_id
    }

    pub fn keypair(&self) -> &OperatorKeypair {
        &self.keypair
    }

    pub fn public_key(&self) -> BlsPublicKey {
        self.keypair.public_key()
    }
}
