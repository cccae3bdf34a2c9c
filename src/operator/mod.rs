//! # Operator Event Loop
//!
//! The coordinator that ties the collaborators together. After checking that the operator
//! is registered, [`Operator::start`] multiplexes over four sources until it is told to stop:
//!
//! ```text
//!            ┌───────────────────────── biased select ─────────────────────────┐
//! shutdown ──┤ 1. cancellation        → return Ok(())                          │
//! auxiliary ─┤ 2. auxiliary failure   → return Err(AuxiliaryFailure)           │
//! feed ──────┤ 3. task                → delegate → sign → dispatch (detached)  │
//!            │    feed error          → drop handle, back off, resubscribe     │
//! backoff ───┤ 4. no live feed        → wait retry delay, subscribe            │
//!            └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tasks are handled one at a time in feed order; only aggregator delivery leaves the loop.
//! Per-task failures (delegate, signing) skip the task and are never fatal.

pub mod auxiliary;
pub mod bootstrap;
pub mod stats;

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::aggregator::{AggregatorClient, AggregatorDispatcher};
use crate::chain::{FeedItem, OperatorRegistry, Subscription};
use crate::delegate::TaskDelegate;
use crate::error::{OperatorError, Result};
use crate::identity::IdentityContext;
use crate::signer::ResponseSigner;
use crate::subscription::SubscriptionManager;
use crate::types::{SignedTaskResponse, TaskCreatedEvent, TaskResponse};

pub use auxiliary::{AuxiliaryFailure, AuxiliaryMonitor, AuxiliaryReporter};
pub use bootstrap::OperatorBootstrap;
pub use stats::{OperatorStats, OperatorStatsSnapshot};

/// Everything the event loop needs, built independently and handed over at construction
pub struct OperatorComponents {
    pub identity: Arc<IdentityContext>,
    pub registry: Arc<dyn OperatorRegistry>,
    pub subscriptions: SubscriptionManager,
    pub delegate: Arc<dyn TaskDelegate>,
    pub signer: Arc<dyn ResponseSigner>,
    pub aggregator: Arc<dyn AggregatorClient>,
    /// Bound on concurrent aggregator deliveries; `None` leaves them unbounded
    pub max_in_flight: Option<usize>,
    pub stats: Arc<OperatorStats>,
}

/// The operator event loop
pub struct Operator {
    identity: Arc<IdentityContext>,
    registry: Arc<dyn OperatorRegistry>,
    subscriptions: SubscriptionManager,
    delegate: Arc<dyn TaskDelegate>,
    signer: Arc<dyn ResponseSigner>,
    dispatcher: AggregatorDispatcher,
    stats: Arc<OperatorStats>,
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("operator_address", self.identity.operator_address())
            .field("operator_id", self.identity.operator_id())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl Operator {
    pub fn new(components: OperatorComponents) -> Self {
        let OperatorComponents {
            identity,
            registry,
            subscriptions,
            delegate,
            signer,
            aggregator,
            max_in_flight,
            stats,
        } = components;

        Self {
            identity,
            registry,
            subscriptions,
            delegate,
            signer,
            dispatcher: AggregatorDispatcher::new(aggregator, max_in_flight, Arc::clone(&stats)),
            stats,
        }
    }

    pub fn identity(&self) -> &Arc<IdentityContext> {
        &self.identity
    }

    pub fn stats(&self) -> Arc<OperatorStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` fires (or its sender is dropped).
    ///
    /// Returns an error when the operator is not registered, when an auxiliary subsystem
    /// fails, or when re-subscribing exhausts its configured attempts.
    pub async fn start(
        mut self,
        mut shutdown: oneshot::Receiver<()>,
        mut auxiliary: AuxiliaryMonitor,
    ) -> Result<()> {
        let operator_address = *self.identity.operator_address();
        if !self
            .registry
            .is_operator_registered(&operator_address)
            .await?
        {
            error!(operator_address = %operator_address, "Operator is not registered");
            return Err(OperatorError::NotRegistered {
                address: operator_address,
            });
        }

        info!(
            operator_address = %operator_address,
            operator_id = %self.identity.operator_id(),
            "🚀 Starting operator"
        );

        let mut subscription: Option<Subscription> = None;

        loop {
            let awaiting_subscription = subscription.is_none();
            let retry_delay = self.subscriptions.retry_delay();

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("🛑 Shutdown signal received, stopping operator");
                    if let Some(subscription) = subscription.take() {
                        subscription.unsubscribe();
                    }
                    return Ok(());
                }

                failure = auxiliary.failed() => {
                    error!(
                        subsystem = %failure.subsystem,
                        reason = %failure.reason,
                        "Auxiliary subsystem failed, stopping operator"
                    );
                    return Err(OperatorError::AuxiliaryFailure {
                        subsystem: failure.subsystem,
                        reason: failure.reason,
                    });
                }

                item = next_feed_item(&mut subscription) => match item {
                    FeedItem::Task(event) => self.handle_task(event).await,
                    FeedItem::Failed(error) => {
                        let subscription_id = subscription.as_ref().map(Subscription::id);
                        warn!(
                            subscription_id = ?subscription_id,
                            error = %error,
                            "Task subscription failed, resubscribing"
                        );
                        if let Some(spent) = subscription.take() {
                            spent.unsubscribe();
                        }
                        self.stats.record_resubscription();
                        self.subscriptions.record_feed_failure();
                        if self.subscriptions.is_exhausted() {
                            error!(error = %error, "Giving up on task subscription");
                            return Err(OperatorError::SubscriptionExhausted {
                                attempts: self.subscriptions.consecutive_failures(),
                                last_error: error,
                            });
                        }
                    }
                },

                _ = tokio::time::sleep(retry_delay), if awaiting_subscription => {
                    match self.subscriptions.subscribe().await {
                        Ok(fresh) => {
                            info!(subscription_id = fresh.id(), "Listening for new tasks");
                            subscription = Some(fresh);
                        }
                        Err(error) if self.subscriptions.is_exhausted() => {
                            error!(error = %error, "Giving up on task subscription");
                            return Err(OperatorError::SubscriptionExhausted {
                                attempts: self.subscriptions.consecutive_failures(),
                                last_error: error,
                            });
                        }
                        Err(_) => {}
                    }
                }
            }
        }
    }

    /// delegate → sign → dispatch for one event
    async fn handle_task(&mut self, event: TaskCreatedEvent) {
        let task_index = event.task_index;
        if !self.subscriptions.admit(&event) {
            debug!(task_index, "Skipping already processed task");
            self.stats.record_duplicate_skipped();
            return;
        }

        self.stats.record_task_received(task_index);
        info!(
            task_index,
            client_id = %event.client_id,
            task_created_block = event.task_created_block,
            quorum_numbers = %alloy::hex::encode_prefixed(&event.quorum_numbers),
            quorum_threshold_percentage = event.quorum_threshold_percentage,
            "Received new task"
        );

        let outcome = self.process_task(&event).await;
        self.subscriptions.record_processed(&event);

        if let Some(signed) = outcome {
            // detached: the loop never waits on the aggregator
            self.dispatcher.dispatch(signed);
        }
    }

    async fn process_task(&self, event: &TaskCreatedEvent) -> Option<SignedTaskResponse> {
        let task_index = event.task_index;

        let payload = match self.delegate.process(&event.client_id).await {
            Ok(payload) => payload,
            Err(error) => {
                self.stats.record_delegate_failure();
                warn!(task_index, client_id = %event.client_id, error = %error, "Task delegate failed, skipping task");
                return None;
            }
        };

        let response = TaskResponse::new(task_index, payload);
        match self.signer.sign(response) {
            Ok(signed) => {
                debug!(
                    task_index,
                    operator_id = %signed.operator_id(),
                    "Task response signed"
                );
                Some(signed)
            }
            Err(error) => {
                self.stats.record_signing_failure();
                error!(task_index, error = %error, "Failed to sign task response, skipping task");
                None
            }
        }
    }
}

/// Next item from the live feed; never resolves while there is none
async fn next_feed_item(subscription: &mut Option<Subscription>) -> FeedItem {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
