//! # Chain Collaborators
//!
//! The operator only needs two things from the chain:
//!
//! - a live feed of [`TaskCreatedEvent`]s ([`TaskEventSource`]), and
//! - read-only registration queries ([`OperatorRegistry`]).
//!
//! A feed is handed out as a [`Subscription`]: a bounded event channel plus an independent
//! error channel that fires at most once, when the producer's transport breaks. Once that
//! happens the handle is spent; the owner drops it and asks the source for a new one.
//!
//! ```text
//! TaskEventSource::subscribe(from_block)
//!        │
//!        ├─ spawn producer ──► TaskFeed ──events──► Subscription::next()
//!        │                           └──error (once)──┘
//!        ▼
//!   Subscription (owned by the operator event loop)
//! ```

pub mod contracts;
pub mod events;
pub mod registry;
pub mod rpc;
pub mod subscriber;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::{OperatorAddress, OperatorId, TaskCreatedEvent};
use rpc::RpcError;

pub use registry::RpcOperatorRegistry;
pub use subscriber::PollingTaskSubscriber;

/// Why a subscription could not be established or stopped delivering events
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("event feed closed")]
    Closed,
}

impl From<RpcError> for SubscriptionError {
    fn from(error: RpcError) -> Self {
        SubscriptionError::Transport(error.to_string())
    }
}

/// Source of new-task notifications
#[async_trait]
pub trait TaskEventSource: Send + Sync {
    /// Establish a new feed.
    ///
    /// `from_block` asks the source to replay events starting at that block (inclusive);
    /// `None` means "new events only".
    async fn subscribe(
        &self,
        subscription_id: u64,
        from_block: Option<u64>,
    ) -> Result<Subscription, SubscriptionError>;
}

/// Read-only registration queries against the registry coordinator
#[async_trait]
pub trait OperatorRegistry: Send + Sync {
    async fn is_operator_registered(&self, address: &OperatorAddress) -> Result<bool, RpcError>;

    async fn operator_id(&self, address: &OperatorAddress) -> Result<OperatorId, RpcError>;
}

/// What a subscription produced next
#[derive(Debug)]
pub enum FeedItem {
    Task(TaskCreatedEvent),
    Failed(SubscriptionError),
}

/// Producer half of a [`Subscription`]
#[derive(Debug)]
pub struct TaskFeed {
    events: mpsc::Sender<TaskCreatedEvent>,
    errors: Option<oneshot::Sender<SubscriptionError>>,
}

impl TaskFeed {
    /// Push an event; returns `false` once the subscription has been dropped.
    pub async fn send(&self, event: TaskCreatedEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Fire the error feed. Only the first call has any effect.
    pub fn fail(&mut self, error: SubscriptionError) {
        if let Some(errors) = self.errors.take() {
            let _ = errors.send(error);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Live handle on a task feed.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops its producer.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    events: mpsc::Receiver<TaskCreatedEvent>,
    errors: oneshot::Receiver<SubscriptionError>,
    start_block: Option<u64>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Create a connected producer/consumer pair
    pub fn channel(id: u64, buffer_size: usize) -> (TaskFeed, Subscription) {
        let (event_sender, event_receiver) = mpsc::channel(buffer_size.max(1));
        let (error_sender, error_receiver) = oneshot::channel();
        (
            TaskFeed {
                events: event_sender,
                errors: Some(error_sender),
            },
            Subscription {
                id,
                events: event_receiver,
                errors: error_receiver,
                start_block: None,
                producer: None,
            },
        )
    }

    /// Tie the lifetime of the producer task to this handle
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Record the first block this feed covers
    pub fn with_start_block(mut self, start_block: u64) -> Self {
        self.start_block = Some(start_block);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// First block covered by this feed, if the source reported one
    pub fn start_block(&self) -> Option<u64> {
        self.start_block
    }

    /// Wait for the next event or for the feed to fail.
    ///
    /// Events already buffered are always yielded before the failure. After a
    /// [`FeedItem::Failed`] the handle must be discarded.
    pub async fn next(&mut self) -> FeedItem {
        tokio::select! {
            biased;
            event = self.events.recv() => match event {
                Some(event) => FeedItem::Task(event),
                None => FeedItem::Failed((&mut self.errors).await.unwrap_or(SubscriptionError::Closed)),
            },
            error = &mut self.errors => {
                FeedItem::Failed(error.unwrap_or(SubscriptionError::Closed))
            }
        }
    }

    pub fn unsubscribe(self) {
        debug!(subscription_id = self.id, "Unsubscribing from task feed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}
