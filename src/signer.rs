//! # Response Signer
//!
//! Turns a [`TaskResponse`] into a [`SignedTaskResponse`]. The digest is keccak256 of the
//! contract ABI encoding of the response struct, `abi.encode(TaskResponse)`, the same bytes
//! the task manager hashes when it checks a response. The operator signs that digest with
//! its BLS key so the aggregator can fold the quorum's signatures into one.
//!
//! The digest depends on nothing but the response fields, so signing is pure and can run
//! concurrently against the shared [`IdentityContext`].

use alloy::primitives::{keccak256, B256};
use alloy::sol_types::SolValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::chain::contracts;
use crate::identity::{BlsPublicKey, IdentityContext};
use crate::types::{SignedTaskResponse, TaskResponse};

/// Default cap on the payload size accepted for signing (1 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("failed to digest task response: {0}")]
    Digest(#[from] DigestError),

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Deterministic digest of a task response
pub fn task_response_digest(
    response: &TaskResponse,
    max_payload_bytes: usize,
) -> Result<B256, DigestError> {
    let len = response.payload.len();
    if len > max_payload_bytes {
        return Err(DigestError::PayloadTooLarge {
            len,
            max: max_payload_bytes,
        });
    }

    let encoded = contracts::TaskResponse {
        referenceTaskIndex: response.reference_task_index,
        payload: response.payload.clone(),
    }
    .abi_encode();
    Ok(keccak256(encoded))
}

/// Signs task responses with the operator's key
pub trait ResponseSigner: Send + Sync {
    /// Digest and sign `response`. On error nothing has been signed.
    fn sign(&self, response: TaskResponse) -> Result<SignedTaskResponse, SignerError>;
}

/// [`ResponseSigner`] backed by the operator keypair in the identity context
#[derive(Debug, Clone)]
pub struct KeypairSigner {
    identity: Arc<IdentityContext>,
    max_payload_bytes: usize,
}

impl KeypairSigner {
    pub fn new(identity: Arc<IdentityContext>) -> Self {
        Self {
            identity,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn identity(&self) -> &Arc<IdentityContext> {
        &self.identity
    }
}

impl ResponseSigner for KeypairSigner {
    fn sign(&self, response: TaskResponse) -> Result<SignedTaskResponse, SignerError> {
        let digest = task_response_digest(&response, self.max_payload_bytes)?;
        let signature = self.identity.keypair().sign(&digest);

        debug!(
            task_index = response.reference_task_index,
            digest = %digest,
            "Signed task response"
        );

        Ok(SignedTaskResponse::new(
            response,
            signature,
            *self.identity.operator_id(),
        ))
    }
}

impl SignedTaskResponse {
    /// Recompute the digest of the embedded response and check the signature against
    /// `public_key`.
    pub fn verify(&self, public_key: &BlsPublicKey) -> bool {
        // verification has no size limit of its own; the signer already enforced one
        let Ok(digest) = task_response_digest(self.task_response(), usize::MAX) else {
            return false;
        };
        public_key.verify(&digest, self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OperatorKeypair;
    use crate::types::{OperatorAddress, OperatorId};
    use proptest::prelude::*;

    fn identity() -> Arc<IdentityContext> {
        Arc::new(IdentityContext::new(
            OperatorAddress::from([1u8; 20]),
            OperatorKeypair::from_secret_bytes(&[3u8; 32]).unwrap(),
            OperatorId::from([4u8; 32]),
        ))
    }

    #[test]
    fn digest_matches_abi_encoded_struct() {
        let response = TaskResponse::new(7, "ABCXYZ");

        // offset of the dynamic tuple, index, offset of payload, len, padded payload
        let mut expected = Vec::new();
        for word in [0x20u8, 7, 0x40, 6] {
            let mut padded = [0u8; 32];
            padded[31] = word;
            expected.extend_from_slice(&padded);
        }
        let mut padded = [0u8; 32];
        padded[..6].copy_from_slice(b"ABCXYZ");
        expected.extend_from_slice(&padded);

        assert_eq!(
            task_response_digest(&response, DEFAULT_MAX_PAYLOAD_BYTES).unwrap(),
            keccak256(expected)
        );
    }

    #[test]
    fn digest_separates_index_and_payload() {
        let a = task_response_digest(&TaskResponse::new(7, "ABCXYZ"), 64).unwrap();
        let b = task_response_digest(&TaskResponse::new(8, "ABCXYZ"), 64).unwrap();
        let c = task_response_digest(&TaskResponse::new(7, "ABCXYz"), 64).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let signer = KeypairSigner::new(identity()).with_max_payload_bytes(4);
        let err = signer.sign(TaskResponse::new(1, "too long")).unwrap_err();
        assert_eq!(
            err,
            SignerError::Digest(DigestError::PayloadTooLarge { len: 8, max: 4 })
        );
    }

    #[test]
    fn signed_response_carries_operator_id_and_verifies() {
        let identity = identity();
        let signer = KeypairSigner::new(Arc::clone(&identity));
        let signed = signer.sign(TaskResponse::new(7, "ABCXYZ")).unwrap();

        assert_eq!(signed.task_index(), 7);
        assert_eq!(signed.operator_id(), identity.operator_id());
        assert!(signed.verify(&identity.public_key()));

        let other = OperatorKeypair::from_secret_bytes(&[8u8; 32]).unwrap();
        assert!(!signed.verify(&other.public_key()));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let identity = identity();
        let signed = KeypairSigner::new(Arc::clone(&identity))
            .sign(TaskResponse::new(7, "ABCXYZ"))
            .unwrap();
        let tampered = SignedTaskResponse::new(
            TaskResponse::new(7, "ABCXYW"),
            *signed.signature(),
            *signed.operator_id(),
        );
        assert!(!tampered.verify(&identity.public_key()));
    }

    proptest! {
        #[test]
        fn signing_is_deterministic(index in any::<u32>(), payload in ".{0,200}") {
            let signer = KeypairSigner::new(identity());
            let response = TaskResponse::new(index, payload);

            let first = signer.sign(response.clone()).unwrap();
            let second = signer.sign(response.clone()).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.task_index(), index);
            prop_assert!(first.verify(&signer.identity().public_key()));
        }
    }
}
