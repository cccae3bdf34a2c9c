//! In-process collaborators for the event loop

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};
use tokio::task::JoinHandle;

use avs_operator::aggregator::{AggregatorClient, AggregatorError};
use avs_operator::chain::rpc::RpcError;
use avs_operator::chain::{OperatorRegistry, Subscription, SubscriptionError, TaskEventSource, TaskFeed};
use avs_operator::delegate::{DelegateError, TaskDelegate};
use avs_operator::error::Result;
use avs_operator::operator::{AuxiliaryMonitor, Operator, OperatorComponents, OperatorStats};
use avs_operator::signer::{DigestError, KeypairSigner, ResponseSigner, SignerError};
use avs_operator::subscription::{ResubscribePolicy, SubscriptionManager};
use avs_operator::types::{ClientId, OperatorAddress, OperatorId, SignedTaskResponse, TaskResponse};

use super::{test_identity, OPERATOR_ID};

/// One established mock subscription, handed to the test so it can drive the feed
pub struct OpenedFeed {
    pub subscription_id: u64,
    pub from_block: Option<u64>,
    pub feed: TaskFeed,
}

/// Task source whose feeds are driven by the test
pub struct MockEventSource {
    opened: mpsc::UnboundedSender<OpenedFeed>,
    failures_remaining: AtomicU32,
    subscribe_calls: AtomicU32,
    break_feeds: AtomicBool,
}

impl MockEventSource {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OpenedFeed>) {
        let (opened, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                opened,
                failures_remaining: AtomicU32::new(0),
                subscribe_calls: AtomicU32::new(0),
                break_feeds: AtomicBool::new(false),
            }),
            receiver,
        )
    }

    /// Make the next `count` subscribe calls fail
    pub fn fail_next_subscribes(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Accept every subscribe but fail the feed before it delivers anything
    pub fn break_feeds_on_open(&self) {
        self.break_feeds.store(true, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskEventSource for MockEventSource {
    async fn subscribe(
        &self,
        subscription_id: u64,
        from_block: Option<u64>,
    ) -> std::result::Result<Subscription, SubscriptionError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(SubscriptionError::Transport("websocket refused".to_string()));
        }

        let (mut feed, subscription) = Subscription::channel(subscription_id, 16);
        if self.break_feeds.load(Ordering::SeqCst) {
            feed.fail(SubscriptionError::Transport("connection reset by peer".to_string()));
            return Ok(subscription.with_start_block(from_block.unwrap_or(100)));
        }
        let _ = self.opened.send(OpenedFeed {
            subscription_id,
            from_block,
            feed,
        });
        Ok(subscription.with_start_block(from_block.unwrap_or(100)))
    }
}

pub struct MockRegistry {
    pub registered: bool,
    pub operator_id: OperatorId,
}

impl MockRegistry {
    pub fn registered() -> Arc<Self> {
        Arc::new(Self {
            registered: true,
            operator_id: OperatorId::from(OPERATOR_ID),
        })
    }

    pub fn unregistered() -> Arc<Self> {
        Arc::new(Self {
            registered: false,
            operator_id: OperatorId::from([0u8; 32]),
        })
    }
}

#[async_trait]
impl OperatorRegistry for MockRegistry {
    async fn is_operator_registered(
        &self,
        _address: &OperatorAddress,
    ) -> std::result::Result<bool, RpcError> {
        Ok(self.registered)
    }

    async fn operator_id(
        &self,
        _address: &OperatorAddress,
    ) -> std::result::Result<OperatorId, RpcError> {
        Ok(self.operator_id)
    }
}

/// Delegate that records every call and answers from a table
#[derive(Default)]
pub struct RecordingDelegate {
    calls: Mutex<Vec<ClientId>>,
    payloads: Mutex<HashMap<ClientId, String>>,
    failing: Mutex<HashSet<ClientId>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, client_id: u64, payload: &str) {
        self.payloads
            .lock()
            .insert(ClientId::from(client_id), payload.to_string());
    }

    pub fn fail_for(&self, client_id: u64) {
        self.failing.lock().insert(ClientId::from(client_id));
    }

    pub fn calls(&self) -> Vec<ClientId> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TaskDelegate for RecordingDelegate {
    async fn process(&self, client_id: &ClientId) -> std::result::Result<String, DelegateError> {
        self.calls.lock().push(*client_id);
        if self.failing.lock().contains(client_id) {
            return Err(DelegateError::EmptyPayload);
        }
        Ok(self
            .payloads
            .lock()
            .get(client_id)
            .cloned()
            .unwrap_or_else(|| format!("result-{client_id}")))
    }
}

/// Delegate whose calls park until the test opens the gate
pub struct GatedDelegate {
    calls: Mutex<Vec<ClientId>>,
    entered: Notify,
    gate: Semaphore,
}

impl GatedDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        })
    }

    /// Resolves once some call is parked at the gate
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.add_permits(64);
    }

    pub fn calls(&self) -> Vec<ClientId> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TaskDelegate for GatedDelegate {
    async fn process(&self, client_id: &ClientId) -> std::result::Result<String, DelegateError> {
        self.calls.lock().push(*client_id);
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DelegateError::EmptyPayload)?;
        Ok(format!("result-{client_id}"))
    }
}

/// Real signer that reports a digest failure for selected task indexes
pub struct FlakySigner {
    inner: KeypairSigner,
    fail_for: HashSet<u32>,
}

impl FlakySigner {
    pub fn failing_for(task_indexes: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            inner: KeypairSigner::new(test_identity()),
            fail_for: task_indexes.iter().copied().collect(),
        })
    }
}

impl ResponseSigner for FlakySigner {
    fn sign(&self, response: TaskResponse) -> std::result::Result<SignedTaskResponse, SignerError> {
        if self.fail_for.contains(&response.reference_task_index) {
            return Err(SignerError::Digest(DigestError::PayloadTooLarge {
                len: response.payload.len(),
                max: 0,
            }));
        }
        self.inner.sign(response)
    }
}

/// Aggregator that forwards every delivery to the test
pub struct RecordingAggregator {
    delivered: mpsc::UnboundedSender<SignedTaskResponse>,
}

impl RecordingAggregator {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SignedTaskResponse>) {
        let (delivered, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { delivered }), receiver)
    }
}

#[async_trait]
impl AggregatorClient for RecordingAggregator {
    async fn deliver(
        &self,
        response: &SignedTaskResponse,
    ) -> std::result::Result<(), AggregatorError> {
        let _ = self.delivered.send(response.clone());
        Ok(())
    }
}

/// Fully mocked operator plus the handles a test needs to drive and observe it
pub struct Harness {
    pub source: Arc<MockEventSource>,
    pub feeds: mpsc::UnboundedReceiver<OpenedFeed>,
    pub delegate: Arc<RecordingDelegate>,
    pub deliveries: mpsc::UnboundedReceiver<SignedTaskResponse>,
    pub stats: Arc<OperatorStats>,
    registry: Arc<MockRegistry>,
    delegate_override: Option<Arc<dyn TaskDelegate>>,
    signer: Arc<dyn ResponseSigner>,
    aggregator: Arc<RecordingAggregator>,
    policy: ResubscribePolicy,
}

impl Harness {
    pub fn new() -> Self {
        let (source, feeds) = MockEventSource::new();
        let (aggregator, deliveries) = RecordingAggregator::new();
        Self {
            source,
            feeds,
            delegate: RecordingDelegate::new(),
            deliveries,
            stats: Arc::new(OperatorStats::new()),
            registry: MockRegistry::registered(),
            delegate_override: None,
            signer: Arc::new(KeypairSigner::new(test_identity())),
            aggregator,
            policy: ResubscribePolicy {
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(40),
                backoff_multiplier: 2.0,
                max_attempts: None,
                healthy_after: Duration::from_secs(60),
            },
        }
    }

    pub fn with_registry(mut self, registry: Arc<MockRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn ResponseSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Replace the recording delegate for this operator
    pub fn with_delegate(mut self, delegate: Arc<dyn TaskDelegate>) -> Self {
        self.delegate_override = Some(delegate);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.policy.initial_backoff = initial;
        self.policy.max_backoff = max;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = Some(max_attempts);
        self
    }

    pub fn build_operator(&self) -> Operator {
        Operator::new(OperatorComponents {
            identity: test_identity(),
            registry: self.registry.clone(),
            subscriptions: SubscriptionManager::new(self.source.clone(), self.policy.clone()),
            delegate: self
                .delegate_override
                .clone()
                .unwrap_or_else(|| self.delegate.clone() as Arc<dyn TaskDelegate>),
            signer: Arc::clone(&self.signer),
            aggregator: self.aggregator.clone(),
            max_in_flight: None,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Start the operator on its own task
    pub fn spawn(&self, auxiliary: AuxiliaryMonitor) -> (oneshot::Sender<()>, JoinHandle<Result<()>>) {
        let operator = self.build_operator();
        let (stop, shutdown) = oneshot::channel();
        let handle = tokio::spawn(operator.start(shutdown, auxiliary));
        (stop, handle)
    }

    pub async fn next_feed(&mut self) -> OpenedFeed {
        super::within(self.feeds.recv())
            .await
            .expect("event source dropped")
    }

    pub async fn next_delivery(&mut self) -> SignedTaskResponse {
        super::within(self.deliveries.recv())
            .await
            .expect("aggregator dropped")
    }
}
