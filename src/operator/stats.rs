//! # Operator Statistics
//!
//! Lock-free counters updated from the event loop and from detached aggregator deliveries,
//! plus a point-in-time [`OperatorStatsSnapshot`] for logging and the periodic reporter.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::TaskIndex;

#[derive(Debug, Default)]
pub struct OperatorStats {
    tasks_received: AtomicU64,
    duplicates_skipped: AtomicU64,
    delegate_failures: AtomicU64,
    signing_failures: AtomicU64,
    responses_dispatched: AtomicU64,
    responses_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    resubscriptions: AtomicU64,
    last_task: Mutex<Option<(TaskIndex, DateTime<Utc>)>>,
}

/// Copy of [`OperatorStats`] at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperatorStatsSnapshot {
    pub tasks_received: u64,
    pub duplicates_skipped: u64,
    pub delegate_failures: u64,
    pub signing_failures: u64,
    pub responses_dispatched: u64,
    pub responses_delivered: u64,
    pub delivery_failures: u64,
    pub resubscriptions: u64,
    pub last_task_index: Option<TaskIndex>,
    pub last_task_at: Option<DateTime<Utc>>,
}

impl OperatorStatsSnapshot {
    /// Dispatched responses whose delivery has not finished yet
    pub fn deliveries_in_flight(&self) -> u64 {
        self.responses_dispatched
            .saturating_sub(self.responses_delivered + self.delivery_failures)
    }
}

impl OperatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task_received(&self, task_index: TaskIndex) {
        self.tasks_received.fetch_add(1, Ordering::Relaxed);
        *self.last_task.lock() = Some((task_index, Utc::now()));
    }

    pub fn record_duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delegate_failure(&self) {
        self.delegate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signing_failure(&self) {
        self.signing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.responses_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.responses_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resubscription(&self) {
        self.resubscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OperatorStatsSnapshot {
        let last_task = *self.last_task.lock();
        OperatorStatsSnapshot {
            tasks_received: self.tasks_received.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            delegate_failures: self.delegate_failures.load(Ordering::Relaxed),
            signing_failures: self.signing_failures.load(Ordering::Relaxed),
            responses_dispatched: self.responses_dispatched.load(Ordering::Relaxed),
            responses_delivered: self.responses_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            resubscriptions: self.resubscriptions.load(Ordering::Relaxed),
            last_task_index: last_task.map(|(index, _)| index),
            last_task_at: last_task.map(|(_, at)| at),
        }
    }
}
