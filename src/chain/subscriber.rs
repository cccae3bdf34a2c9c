//! Task feed backed by `eth_getLogs` polling.
//!
//! Each subscription spawns one producer task that walks the chain forward from its start
//! block in windows of at most `max_block_range` blocks and pushes decoded
//! `NewTaskCreated` events in (block, log index) order. A log that does not decode is
//! logged and skipped; the window still advances past it. Any RPC failure fires the
//! subscription's error feed once and ends the producer; resuming is the caller's job.

use alloy::primitives::Address;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::events::decode_new_task_created;
use super::rpc::ChainClient;
use super::{Subscription, SubscriptionError, TaskEventSource, TaskFeed};

#[derive(Debug, Clone)]
pub struct PollingSubscriberConfig {
    pub poll_interval: Duration,
    pub max_block_range: u64,
    pub event_buffer_size: usize,
}

impl Default for PollingSubscriberConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2_000),
            max_block_range: 1_000,
            event_buffer_size: 256,
        }
    }
}

#[derive(Debug)]
pub struct PollingTaskSubscriber {
    client: ChainClient,
    task_manager: Address,
    config: PollingSubscriberConfig,
}

impl PollingTaskSubscriber {
    pub fn new(client: ChainClient, task_manager: Address, config: PollingSubscriberConfig) -> Self {
        Self {
            client,
            task_manager,
            config,
        }
    }
}

#[async_trait]
impl TaskEventSource for PollingTaskSubscriber {
    async fn subscribe(
        &self,
        subscription_id: u64,
        from_block: Option<u64>,
    ) -> Result<Subscription, SubscriptionError> {
        // a dead transport fails the subscribe call itself, not the feed
        let head = self.client.block_number().await?;
        let start_block = from_block.unwrap_or(head.saturating_add(1));

        let (feed, subscription) = Subscription::channel(subscription_id, self.config.event_buffer_size);
        let producer = tokio::spawn(run_producer(
            self.client.clone(),
            self.task_manager,
            self.config.clone(),
            start_block,
            feed,
        ));

        info!(
            subscription_id,
            task_manager = %self.task_manager,
            head,
            start_block,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Subscribed to new tasks"
        );

        Ok(subscription
            .with_start_block(start_block)
            .with_producer(producer))
    }
}

async fn run_producer(
    client: ChainClient,
    task_manager: Address,
    config: PollingSubscriberConfig,
    mut next_block: u64,
    mut feed: TaskFeed,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if feed.is_closed() {
            debug!("Task feed dropped, stopping log poller");
            return;
        }

        match poll_once(&client, task_manager, &config, next_block, &feed).await {
            Ok(Some(advanced_to)) => next_block = advanced_to,
            Ok(None) => {
                debug!("Task feed dropped mid-poll, stopping log poller");
                return;
            }
            Err(error) => {
                warn!(error = %error, next_block, "Log polling failed, closing subscription");
                feed.fail(error);
                return;
            }
        }
    }
}

/// Deliver every event between `next_block` and the current head.
///
/// Returns the next block to poll, or `None` if the consumer went away.
async fn poll_once(
    client: &ChainClient,
    task_manager: Address,
    config: &PollingSubscriberConfig,
    mut next_block: u64,
    feed: &TaskFeed,
) -> Result<Option<u64>, SubscriptionError> {
    let head = client.block_number().await?;

    while next_block <= head {
        let to_block = head.min(next_block.saturating_add(config.max_block_range.max(1) - 1));

        let mut events = Vec::new();
        for log in client.task_logs(task_manager, next_block, to_block).await? {
            if log.removed {
                continue;
            }
            match decode_new_task_created(&log) {
                Ok(event) => events.push(event),
                Err(error) => warn!(
                    error = %error,
                    block_number = ?log.block_number,
                    log_index = ?log.log_index,
                    transaction_hash = ?log.transaction_hash,
                    "Skipping undecodable task manager log"
                ),
            }
        }
        events.sort_by_key(|event| (event.block_number, event.log_index));

        debug!(
            from_block = next_block,
            to_block,
            events = events.len(),
            "Polled task manager logs"
        );

        for event in events {
            if !feed.send(event).await {
                return Ok(None);
            }
        }
        next_block = to_block.saturating_add(1);
    }

    Ok(Some(next_block))
}
