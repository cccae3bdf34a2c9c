//! # Subscription Manager
//!
//! Owns the [`TaskEventSource`] and everything needed to replace a broken feed without
//! losing or repeating work:
//!
//! - a resume cursor, the block of the last processed event (or the start block of the
//!   first feed), from which every new feed replays inclusively;
//! - the last processed task index, below which replayed events are dropped;
//! - the backoff state for failed `subscribe` attempts and for feeds that break before
//!   they prove healthy.
//!
//! A successful `subscribe` does not clear the failure count. A node that accepts the
//! subscription and then drops it straight away would otherwise be re-subscribed in a
//! tight loop. The count only resets once a feed delivers a new task or stays up for
//! [`ResubscribePolicy::healthy_after`].
//!
//! The event loop is the only caller, so none of this needs locking.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::chain::{Subscription, SubscriptionError, TaskEventSource};
use crate::types::{TaskCreatedEvent, TaskIndex};

/// How failed subscribe attempts are retried
#[derive(Debug, Clone, PartialEq)]
pub struct ResubscribePolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Uptime after which a feed that failed without delivering a task still counts as healthy
    pub healthy_after: Duration,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_attempts: None,
            healthy_after: Duration::from_secs(30),
        }
    }
}

impl ResubscribePolicy {
    /// Delay before attempt number `failures + 1`
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

pub struct SubscriptionManager {
    source: Arc<dyn TaskEventSource>,
    policy: ResubscribePolicy,
    next_subscription_id: u64,
    resume_block: Option<u64>,
    last_task_index: Option<TaskIndex>,
    consecutive_failures: u32,
    feed_opened_at: Option<Instant>,
    feed_delivered: bool,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("policy", &self.policy)
            .field("next_subscription_id", &self.next_subscription_id)
            .field("resume_block", &self.resume_block)
            .field("last_task_index", &self.last_task_index)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("feed_delivered", &self.feed_delivered)
            .finish()
    }
}

impl SubscriptionManager {
    pub fn new(source: Arc<dyn TaskEventSource>, policy: ResubscribePolicy) -> Self {
        Self {
            source,
            policy,
            next_subscription_id: 1,
            resume_block: None,
            last_task_index: None,
            consecutive_failures: 0,
            feed_opened_at: None,
            feed_delivered: false,
        }
    }

    /// Establish a new feed, resuming from the cursor.
    ///
    /// Failures are counted towards the backoff. A success leaves the count alone until the
    /// new feed proves itself (see [`SubscriptionManager::record_feed_failure`]).
    pub async fn subscribe(&mut self) -> Result<Subscription, SubscriptionError> {
        let subscription_id = self.next_subscription_id;
        self.next_subscription_id += 1;

        match self.source.subscribe(subscription_id, self.resume_block).await {
            Ok(subscription) => {
                if self.resume_block.is_none() {
                    self.resume_block = subscription.start_block();
                }
                if self.consecutive_failures > 0 {
                    info!(
                        subscription_id,
                        failed_attempts = self.consecutive_failures,
                        "Task subscription re-established"
                    );
                }
                self.feed_opened_at = Some(Instant::now());
                self.feed_delivered = false;
                debug!(
                    subscription_id,
                    resume_block = ?self.resume_block,
                    last_task_index = ?self.last_task_index,
                    "Subscribed to task feed"
                );
                Ok(subscription)
            }
            Err(error) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    subscription_id,
                    error = %error,
                    consecutive_failures = self.consecutive_failures,
                    retry_in_ms = self.retry_delay().as_millis() as u64,
                    "Failed to subscribe to task feed"
                );
                Err(error)
            }
        }
    }

    /// `false` for events at or below the last processed task index
    pub fn admit(&self, event: &TaskCreatedEvent) -> bool {
        self.last_task_index
            .map_or(true, |last| event.task_index > last)
    }

    /// Advance the cursor past `event`. Call once per admitted event, whatever its outcome.
    ///
    /// A new task proves the current feed healthy and clears the failure count.
    pub fn record_processed(&mut self, event: &TaskCreatedEvent) {
        self.feed_delivered = true;
        self.consecutive_failures = 0;
        self.last_task_index = Some(
            self.last_task_index
                .map_or(event.task_index, |last| last.max(event.task_index)),
        );
        self.resume_block = Some(
            self.resume_block
                .map_or(event.block_number, |block| block.max(event.block_number)),
        );
    }

    /// Account for the live feed breaking.
    ///
    /// A feed that delivered a new task or outlived `healthy_after` is an ordinary
    /// disconnect and the next subscribe is immediate. Anything shorter counts as one more
    /// consecutive failure and backs off like a refused subscribe.
    pub fn record_feed_failure(&mut self) {
        let uptime = self.feed_opened_at.take().map(|opened| opened.elapsed());
        let healthy = self.feed_delivered
            || uptime.is_some_and(|uptime| uptime >= self.policy.healthy_after);
        self.feed_delivered = false;

        if healthy {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            warn!(
                uptime_ms = uptime.map(|uptime| uptime.as_millis() as u64),
                consecutive_failures = self.consecutive_failures,
                retry_in_ms = self.retry_delay().as_millis() as u64,
                "Task feed failed before delivering a task"
            );
        }
    }

    /// How long to wait before the next subscribe attempt
    pub fn retry_delay(&self) -> Duration {
        self.policy.delay_after(self.consecutive_failures)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// `true` once the configured attempt cap has been reached
    pub fn is_exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.consecutive_failures >= max)
    }

    pub fn resume_block(&self) -> Option<u64> {
        self.resume_block
    }

    pub fn last_task_index(&self) -> Option<TaskIndex> {
        self.last_task_index
    }
}
