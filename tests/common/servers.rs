//! axum fakes for the HTTP peers of the operator

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use alloy::hex;
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::{SolCall, SolEvent};
use avs_operator::chain::contracts::{IRegistryCoordinator, NewTaskCreated};
use avs_operator::chain::events::new_task_created_log_json;
use avs_operator::types::TaskCreatedEvent;

use super::{OPERATOR_ID, TASK_MANAGER};

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

// ---------------------------------------------------------------------------------------
// compute service
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ComputeBehavior {
    Reply(String),
    Status(u16, String),
}

#[derive(Clone)]
struct ComputeState {
    client_ids: Arc<Mutex<Vec<String>>>,
    behavior: Arc<Mutex<ComputeBehavior>>,
}

/// Stand-in for the compute service behind `/run_fhe`
pub struct FakeComputeService {
    pub url: String,
    state: ComputeState,
}

impl FakeComputeService {
    pub async fn start(behavior: ComputeBehavior) -> Self {
        let state = ComputeState {
            client_ids: Arc::new(Mutex::new(Vec::new())),
            behavior: Arc::new(Mutex::new(behavior)),
        };
        let router = Router::new()
            .route("/run_fhe", post(run_fhe))
            .with_state(state.clone());
        let addr = serve(router).await;
        Self {
            url: format!("http://{addr}/run_fhe"),
            state,
        }
    }

    /// `client_id` form values received so far
    pub fn client_ids(&self) -> Vec<String> {
        self.state.client_ids.lock().clone()
    }

    pub fn set_behavior(&self, behavior: ComputeBehavior) {
        *self.state.behavior.lock() = behavior;
    }
}

async fn run_fhe(State(state): State<ComputeState>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("client_id") {
            let value = field.text().await.unwrap_or_default();
            state.client_ids.lock().push(value);
        }
    }

    let behavior = state.behavior.lock().clone();
    match behavior {
        ComputeBehavior::Reply(payload) => (StatusCode::OK, payload).into_response(),
        ComputeBehavior::Status(status, body) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------------------
// aggregator
// ---------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum AggregatorBehavior {
    Accept,
    RpcError(i64, String),
    Status(u16),
}

#[derive(Clone)]
struct AggregatorState {
    requests: mpsc::UnboundedSender<Value>,
    behavior: Arc<Mutex<AggregatorBehavior>>,
}

/// JSON-RPC aggregator that forwards every request body to the test
pub struct FakeAggregator {
    pub url: String,
    requests: mpsc::UnboundedReceiver<Value>,
    behavior: Arc<Mutex<AggregatorBehavior>>,
}

impl FakeAggregator {
    pub async fn start(behavior: AggregatorBehavior) -> Self {
        let (sender, requests) = mpsc::unbounded_channel();
        let behavior = Arc::new(Mutex::new(behavior));
        let router = Router::new()
            .route("/", post(process_signed_task_response))
            .with_state(AggregatorState {
                requests: sender,
                behavior: Arc::clone(&behavior),
            });
        let addr = serve(router).await;
        Self {
            url: format!("http://{addr}/"),
            requests,
            behavior,
        }
    }

    pub async fn next_request(&mut self) -> Value {
        super::within(self.requests.recv())
            .await
            .expect("aggregator server stopped")
    }

    pub fn set_behavior(&self, behavior: AggregatorBehavior) {
        *self.behavior.lock() = behavior;
    }
}

async fn process_signed_task_response(
    State(state): State<AggregatorState>,
    Json(request): Json<Value>,
) -> Response {
    let id = request["id"].clone();
    let _ = state.requests.send(request);

    let behavior = state.behavior.lock().clone();
    match behavior {
        AggregatorBehavior::Accept => {
            Json(json!({ "jsonrpc": "2.0", "id": id, "result": null })).into_response()
        }
        AggregatorBehavior::RpcError(code, message) => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }))
        .into_response(),
        AggregatorBehavior::Status(status) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
    }
}

// ---------------------------------------------------------------------------------------
// chain node
// ---------------------------------------------------------------------------------------

struct NodeState {
    head: AtomicU64,
    /// `(block number, log as eth_getLogs returns it)`
    logs: Mutex<Vec<(u64, Value)>>,
    failing: AtomicBool,
    operator_status: AtomicU8,
    head_queries: AtomicU64,
    log_queries: Mutex<Vec<(u64, u64)>>,
}

/// Minimal JSON-RPC node: `eth_blockNumber`, `eth_getLogs`, and the two registry calls
pub struct FakeChainNode {
    pub url: String,
    state: Arc<NodeState>,
}

impl FakeChainNode {
    pub async fn start(head: u64) -> Self {
        let state = Arc::new(NodeState {
            head: AtomicU64::new(head),
            logs: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            operator_status: AtomicU8::new(1),
            head_queries: AtomicU64::new(0),
            log_queries: Mutex::new(Vec::new()),
        });
        let router = Router::new()
            .route("/", post(node_rpc))
            .with_state(Arc::clone(&state));
        let addr = serve(router).await;
        Self {
            url: format!("http://{addr}/"),
            state,
        }
    }

    /// Emit `NewTaskCreated` from the task manager and mine up to its block
    pub fn emit_task(&self, event: &TaskCreatedEvent) {
        let log = new_task_created_log_json(event, Address::from(TASK_MANAGER));
        self.state.logs.lock().push((event.block_number, log));
        self.state.head.fetch_max(event.block_number, Ordering::SeqCst);
    }

    /// Emit a log carrying the `NewTaskCreated` topic but a payload that does not decode
    pub fn emit_malformed_task(&self, block_number: u64) {
        let log = json!({
            "address": Address::from(TASK_MANAGER),
            "topics": [NewTaskCreated::SIGNATURE_HASH, B256::with_last_byte(1)],
            "data": "0x0020",
            "blockNumber": format!("{block_number:#x}"),
            "logIndex": "0x0",
            "removed": false,
        });
        self.state.logs.lock().push((block_number, log));
        self.state.head.fetch_max(block_number, Ordering::SeqCst);
    }

    pub fn set_head(&self, head: u64) {
        self.state.head.store(head, Ordering::SeqCst);
    }

    /// Answer every request with HTTP 503 while set
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_operator_status(&self, status: u8) {
        self.state.operator_status.store(status, Ordering::SeqCst);
    }

    /// Number of `eth_blockNumber` calls so far
    pub fn head_queries(&self) -> u64 {
        self.state.head_queries.load(Ordering::SeqCst)
    }

    /// `(fromBlock, toBlock)` of every `eth_getLogs` call so far
    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.log_queries.lock().clone()
    }
}

fn quantity_param(value: &Value) -> u64 {
    value
        .as_str()
        .and_then(|q| u64::from_str_radix(q.trim_start_matches("0x"), 16).ok())
        .unwrap_or(0)
}

async fn node_rpc(State(state): State<Arc<NodeState>>, Json(request): Json<Value>) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "node down").into_response();
    }

    let id = request["id"].clone();
    let params = &request["params"];
    let result = match request["method"].as_str().unwrap_or_default() {
        "eth_blockNumber" => {
            state.head_queries.fetch_add(1, Ordering::SeqCst);
            json!(format!("{:#x}", state.head.load(Ordering::SeqCst)))
        }
        "eth_getLogs" => {
            let from = quantity_param(&params[0]["fromBlock"]);
            let to = quantity_param(&params[0]["toBlock"]);
            state.log_queries.lock().push((from, to));
            let logs: Vec<Value> = state
                .logs
                .lock()
                .iter()
                .filter(|(block, _)| (from..=to).contains(block))
                .map(|(_, log)| log.clone())
                .collect();
            json!(logs)
        }
        "eth_call" => {
            let call = &params[0];
            let data = call["input"]
                .as_str()
                .or_else(|| call["data"].as_str())
                .and_then(|d| hex::decode(d).ok())
                .unwrap_or_default();
            let selector = data.get(..4).unwrap_or_default();
            if selector == IRegistryCoordinator::getOperatorStatusCall::SELECTOR {
                let status = state.operator_status.load(Ordering::SeqCst);
                json!(B256::from(U256::from(status)))
            } else if selector == IRegistryCoordinator::getOperatorIdCall::SELECTOR {
                json!(B256::from(OPERATOR_ID))
            } else {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": 3, "message": "execution reverted" }
                }))
                .into_response();
            }
        }
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "method not found" }
            }))
            .into_response();
        }
    };

    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
}
