// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process mock ledger node for tests.
//!
//! Serves the same routes and response shapes as the real node, including
//! its capitalised record fields and its acceptance check for submitted
//! transactions (balance, positive amount, increasing nonce, recoverable
//! signature over the canonical message). Balances and nonces are keyed by
//! the exact address text; only the signer comparison ignores case.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::blockchain::client::NodeClient;
use crate::blockchain::signing::{digest, recover_address, RecoverableSignature};

/// Well-known test key and its checksummed address.
pub const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const TEST_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

const FAUCET_AMOUNT: u64 = 50;

#[derive(Default)]
struct NodeState {
    balances: HashMap<String, u64>,
    nonces: HashMap<String, u64>,
    blocks: Value,
    mempool: Vec<Value>,
    submit_override: Option<(u16, String)>,
    faucet_claimed: HashSet<String>,
    blocks_delay: Option<Duration>,
    hits: HashMap<&'static str, usize>,
}

impl NodeState {
    fn hit(&mut self, path: &'static str) {
        *self.hits.entry(path).or_default() += 1;
    }
}

type Shared = Arc<Mutex<NodeState>>;

pub struct MockNode {
    pub url: String,
    state: Shared,
}

impl MockNode {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(NodeState {
            blocks: json!([]),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/balance", get(balance))
            .route("/submitTx", post(submit))
            .route("/blocks", get(blocks))
            .route("/mempool", get(mempool))
            .route("/faucet", post(faucet))
            .route("/addBalance", post(add_balance))
            .route("/api/resetBalance", post(reset_balance))
            .route("/health", get(|| async { "ok" }))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock node");
        let addr = listener.local_addr().expect("mock node address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// URL of a port nothing listens on.
    pub async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("address");
        drop(listener);
        format!("http://{addr}")
    }

    pub fn client(&self) -> NodeClient {
        NodeClient::new(&self.url, Duration::from_secs(5)).expect("mock client")
    }

    pub fn set_balance(&self, address: &str, balance: u64) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(address.to_string(), balance);
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_blocks(&self, blocks: Value) {
        self.state.lock().unwrap().blocks = blocks;
    }

    pub fn set_blocks_delay(&self, delay: Duration) {
        self.state.lock().unwrap().blocks_delay = Some(delay);
    }

    pub fn force_submit_status(&self, status: u16, message: &str) {
        self.state.lock().unwrap().submit_override = Some((status, message.to_string()));
    }

    pub fn mempool_len(&self) -> usize {
        self.state.lock().unwrap().mempool.len()
    }

    pub fn hits(&self, path: &'static str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

fn plain(status: StatusCode, message: &str) -> Response {
    (status, format!("{message}\n")).into_response()
}

async fn balance(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut node = state.lock().unwrap();
    node.hit("/balance");
    let address = params.get("addr").cloned().unwrap_or_default();
    let balance = node
        .balances
        .get(&address)
        .copied()
        .unwrap_or(0);
    Json(json!({ "address": address, "balance": balance }))
}

async fn submit(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut node = state.lock().unwrap();
    node.hit("/submitTx");

    if let Some((status, message)) = node.submit_override.clone() {
        return plain(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
            &message,
        );
    }

    let from = body["from"].as_str().unwrap_or_default().to_string();
    let to = body["to"].as_str().unwrap_or_default().to_string();
    let signature = body["signature"].as_str().unwrap_or_default().to_string();
    let (Some(amount), Some(nonce)) = (body["amount"].as_u64(), body["nonce"].as_u64()) else {
        return plain(StatusCode::BAD_REQUEST, "invalid body");
    };

    let balance = node
        .balances
        .get(&from)
        .copied()
        .unwrap_or(0);
    if balance < amount {
        return plain(
            StatusCode::BAD_REQUEST,
            &format!("insufficient balance: have {balance}, need {amount}"),
        );
    }
    if amount == 0 {
        return plain(StatusCode::BAD_REQUEST, "amount must be positive");
    }
    let last_nonce = node
        .nonces
        .get(&from)
        .copied()
        .unwrap_or(0);
    if nonce <= last_nonce {
        return plain(
            StatusCode::BAD_REQUEST,
            &format!("invalid nonce: got {nonce}, expected > {last_nonce}"),
        );
    }
    if signature.is_empty() {
        return plain(StatusCode::BAD_REQUEST, "missing signature");
    }

    let message = format!(
        "{{\"from\":\"{}\",\"to\":\"{}\",\"amount\":{},\"nonce\":{}}}",
        from, to, amount, nonce
    );
    let recovered = RecoverableSignature::from_hex(&signature)
        .and_then(|sig| recover_address(&digest(message.as_bytes()), &sig));
    match recovered {
        Ok(address) if address.as_str().eq_ignore_ascii_case(&from) => {}
        Ok(_) => return plain(StatusCode::BAD_REQUEST, "invalid signature"),
        Err(e) => {
            return plain(
                StatusCode::BAD_REQUEST,
                &format!("signature verification error: {e}"),
            )
        }
    }

    node.nonces.insert(from.clone(), nonce);
    node.mempool.push(json!({
        "From": from,
        "To": to,
        "Amount": amount,
        "Nonce": nonce,
        "Signature": signature,
    }));
    Json(json!({ "status": "accepted" })).into_response()
}

async fn blocks(State(state): State<Shared>) -> Json<Value> {
    let delay = {
        let mut node = state.lock().unwrap();
        node.hit("/blocks");
        node.blocks_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Json(state.lock().unwrap().blocks.clone())
}

async fn mempool(State(state): State<Shared>) -> Json<Value> {
    let mut node = state.lock().unwrap();
    node.hit("/mempool");
    Json(Value::Array(node.mempool.clone()))
}

async fn faucet(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut node = state.lock().unwrap();
    node.hit("/faucet");

    let address = body["address"].as_str().unwrap_or_default().to_string();
    if address.is_empty() {
        return plain(StatusCode::BAD_REQUEST, r#"{"error":"Address is required"}"#);
    }
    if !node.faucet_claimed.insert(address.clone()) {
        return plain(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":"Please wait 1 minute between faucet requests"}"#,
        );
    }

    let balance = node.balances.entry(address.clone()).or_default();
    *balance += FAUCET_AMOUNT;
    let balance = *balance;
    Json(json!({
        "address": address,
        "amount": FAUCET_AMOUNT,
        "balance": balance,
        "status": "ok",
    }))
    .into_response()
}

async fn add_balance(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut node = state.lock().unwrap();
    let user_id = body["userId"].as_str().unwrap_or_default().to_string();
    let amount = body["amount"].as_u64().unwrap_or(0);
    if user_id.is_empty() || amount == 0 {
        return plain(StatusCode::BAD_REQUEST, "invalid body");
    }
    let balance = node.balances.entry(user_id).or_default();
    *balance += amount;
    let new_balance = *balance;
    Json(json!({ "success": true, "newBalance": new_balance })).into_response()
}

async fn reset_balance(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut node = state.lock().unwrap();
    let address = body["address"].as_str().unwrap_or_default().to_string();
    if address.is_empty() {
        return plain(StatusCode::BAD_REQUEST, "invalid body");
    }
    node.balances.insert(address, 0);
    Json(json!({ "success": true, "newBalance": 0 })).into_response()
}
