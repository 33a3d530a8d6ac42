//! An in-process relay serving the builder API, for tests.

use crate::{
    constants::{SUBMIT_BLOCK_PATH, VALIDATORS_PATH},
    primitives::ValidatorData,
};
use alloy::primitives::{B256, U256};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{net::TcpListener, task::JoinHandle};
use url::Url;

/// Body of a validators response listing `entries`.
pub fn validators_response(entries: &[(u64, ValidatorData)]) -> Value {
    entries
        .iter()
        .map(|(slot, validator)| {
            json!({
                "slot": slot.to_string(),
                "entry": {
                    "message": {
                        "fee_recipient": validator.fee_recipient.to_string(),
                        "gas_limit": validator.gas_limit.to_string(),
                        "timestamp": "0",
                        "pubkey": validator.pubkey.as_str(),
                    },
                    "signature": "0x",
                },
            })
        })
        .collect()
}

/// Body of a get-header response carrying a bid of `value` for a block with
/// the given transactions root.
pub fn header_response(value: U256, transactions_root: B256) -> Value {
    json!({
        "version": "capella",
        "data": {
            "message": {
                "header": {
                    "parent_hash": B256::repeat_byte(0x11),
                    "block_hash": B256::repeat_byte(0x33),
                    "transactions_root": transactions_root,
                },
                "value": value.to_string(),
                "pubkey": "0xb0b",
            },
            "signature": "0x",
        },
    })
}

#[derive(Debug)]
struct MockState {
    validators: Mutex<Value>,
    validator_fetches: AtomicUsize,
    fail_validators: AtomicBool,
    validators_delay: Mutex<Duration>,
    header: Mutex<Option<Value>>,
    submit_status: AtomicU16,
    submissions: Mutex<Vec<Value>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            validators: Mutex::new(Value::Array(vec![])),
            validator_fetches: AtomicUsize::new(0),
            fail_validators: AtomicBool::new(false),
            validators_delay: Mutex::new(Duration::ZERO),
            header: Mutex::new(None),
            submit_status: AtomicU16::new(StatusCode::OK.as_u16()),
            submissions: Mutex::new(vec![]),
        }
    }
}

async fn validators(State(state): State<Arc<MockState>>) -> Response {
    state.validator_fetches.fetch_add(1, Ordering::SeqCst);

    let delay = *state.validators_delay.lock().unwrap_or_else(PoisonError::into_inner);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state.fail_validators.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "unavailable").into_response();
    }
    let body = state.validators.lock().unwrap_or_else(PoisonError::into_inner).clone();
    Json(body).into_response()
}

async fn header(State(state): State<Arc<MockState>>) -> Response {
    match state.header.lock().unwrap_or_else(PoisonError::into_inner).clone() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn submit(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.submissions.lock().unwrap_or_else(PoisonError::into_inner).push(body);
    let status = StatusCode::from_u16(state.submit_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    status.into_response()
}

/// A relay served on a random local port.
///
/// The validator list, the bid and the submission status code can be set at
/// any time. Every validator fetch and block submission is recorded. The
/// server stops when the mock is dropped.
#[derive(Debug)]
pub struct MockRelay {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockRelay {
    /// Start a mock relay.
    pub async fn spawn() -> io::Result<Self> {
        let state = Arc::new(MockState::default());
        let router = Router::new()
            .route(VALIDATORS_PATH, get(validators))
            .route("/eth/v1/builder/header/:slot/:parent_hash/:pubkey", get(header))
            .route(SUBMIT_BLOCK_PATH, post(submit))
            .with_state(state.clone());

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(%err, "mock relay failed");
            }
        });

        Ok(Self { addr, state, handle })
    }

    /// Base URL of the relay.
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("socket address is a valid url")
    }

    /// Serve `entries` as the validator list.
    pub fn set_validators(&self, entries: &[(u64, ValidatorData)]) {
        self.set_validators_raw(validators_response(entries));
    }

    /// Serve `body` as the validator list.
    pub fn set_validators_raw(&self, body: Value) {
        *self.state.validators.lock().unwrap_or_else(PoisonError::into_inner) = body;
    }

    /// Make validator fetches answer 500.
    pub fn fail_validators(&self, fail: bool) {
        self.state.fail_validators.store(fail, Ordering::SeqCst);
    }

    /// Delay every validator fetch by `delay`.
    pub fn delay_validators(&self, delay: Duration) {
        *self.state.validators_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of validator fetches served so far.
    pub fn validator_fetches(&self) -> usize {
        self.state.validator_fetches.load(Ordering::SeqCst)
    }

    /// Serve `body` as the bid, or answer 204 if `None`.
    pub fn set_header(&self, body: Option<Value>) {
        *self.state.header.lock().unwrap_or_else(PoisonError::into_inner) = body;
    }

    /// Answer block submissions with `status`.
    pub fn set_submit_status(&self, status: u16) {
        self.state.submit_status.store(status, Ordering::SeqCst);
    }

    /// Bodies of every block submission received.
    pub fn submissions(&self) -> Vec<Value> {
        self.state.submissions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
