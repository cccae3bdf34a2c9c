//! Solidity bindings for the task manager and the registry coordinator.
//!
//! Only the pieces the operator reads or signs are declared here. `sol!` derives the ABI
//! codec, the event topic and the typed `eth_call` builders from these declarations.

use alloy::sol;

sol! {
    /// A task as the task manager stores and emits it
    #[derive(Debug, PartialEq, Eq)]
    struct Task {
        uint256 computeRequestClientId;
        uint32 taskCreatedBlock;
        bytes quorumNumbers;
        uint32 quorumThresholdPercentage;
    }

    /// The struct whose `abi.encode` digest operators sign
    #[derive(Debug, PartialEq, Eq)]
    struct TaskResponse {
        uint32 referenceTaskIndex;
        string payload;
    }

    #[derive(Debug, PartialEq, Eq)]
    event NewTaskCreated(uint32 indexed taskIndex, Task task);
}

sol! {
    #[sol(rpc)]
    interface IRegistryCoordinator {
        function getOperatorStatus(address operator) external view returns (uint8 status);
        function getOperatorId(address operator) external view returns (bytes32 operatorId);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn event_topic_matches_canonical_signature() {
        assert_eq!(
            NewTaskCreated::SIGNATURE,
            "NewTaskCreated(uint32,(uint256,uint32,bytes,uint32))"
        );
        assert_eq!(
            NewTaskCreated::SIGNATURE_HASH,
            keccak256(NewTaskCreated::SIGNATURE.as_bytes())
        );
    }

    #[test]
    fn registry_selectors_match_signatures() {
        assert_eq!(
            IRegistryCoordinator::getOperatorStatusCall::SELECTOR,
            keccak256("getOperatorStatus(address)")[..4]
        );
        assert_eq!(
            IRegistryCoordinator::getOperatorIdCall::SELECTOR,
            keccak256("getOperatorId(address)")[..4]
        );
    }
}
