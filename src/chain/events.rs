//! `NewTaskCreated` log decoding.

use alloy::primitives::{Address, LogData};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use thiserror::Error;

use super::contracts::{NewTaskCreated, Task};
use crate::types::TaskCreatedEvent;

#[derive(Error, Debug)]
pub enum EventDecodeError {
    #[error("log is not a NewTaskCreated event: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("pending log without block number")]
    Pending,
}

pub fn decode_new_task_created(log: &Log) -> Result<TaskCreatedEvent, EventDecodeError> {
    let block_number = log.block_number.ok_or(EventDecodeError::Pending)?;
    let decoded = log.log_decode::<NewTaskCreated>()?;
    let NewTaskCreated {
        taskIndex: task_index,
        task,
    } = decoded.inner.data;

    Ok(TaskCreatedEvent {
        task_index,
        client_id: task.computeRequestClientId,
        task_created_block: task.taskCreatedBlock,
        quorum_numbers: task.quorumNumbers.to_vec(),
        quorum_threshold_percentage: task.quorumThresholdPercentage,
        block_number,
        log_index: log.log_index.unwrap_or(0),
    })
}

/// Topics and data of `event` exactly as the task manager emits them
pub fn new_task_created_log_data(event: &TaskCreatedEvent) -> LogData {
    NewTaskCreated {
        taskIndex: event.task_index,
        task: Task {
            computeRequestClientId: event.client_id,
            taskCreatedBlock: event.task_created_block,
            quorumNumbers: event.quorum_numbers.clone().into(),
            quorumThresholdPercentage: event.quorum_threshold_percentage,
        },
    }
    .encode_log_data()
}

/// `event` in the JSON shape `eth_getLogs` returns it
pub fn new_task_created_log_json(event: &TaskCreatedEvent, emitter: Address) -> serde_json::Value {
    let data = new_task_created_log_data(event);
    serde_json::json!({
        "address": emitter,
        "topics": data.topics(),
        "data": data.data,
        "blockNumber": format!("{:#x}", event.block_number),
        "logIndex": format!("{:#x}", event.log_index),
        "removed": false,
    })
}
