//! # REST + JSON-RPC API
//!
//! Builds the axum router that exposes the vault node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                         |
//! |--------|------------------------|-------------------------------------|
//! | GET    | `/health`              | Liveness check                      |
//! | GET    | `/status`              | Node status summary                 |
//! | POST   | `/rpc`                 | JSON-RPC 2.0 gateway                |
//! | GET    | `/vaults/:admin`       | Vault state and balance             |
//! | GET    | `/accounts/:identity`  | Wallet balance                      |
//!
//! ## JSON-RPC Methods
//!
//! Params are named (a JSON object). Identities are base58 strings.
//!
//! | Method                  | Params                                              |
//! |-------------------------|-----------------------------------------------------|
//! | `vault_initialize`      | `admin`                                             |
//! | `vault_deposit`         | `vault, caller, amount`                             |
//! | `vault_withdraw`        | `vault, caller, amount`                             |
//! | `vault_addPayee`        | `vault, caller, payee`                              |
//! | `vault_removePayee`     | `vault, caller, payee`                              |
//! | `vault_schedulePayout`  | `vault, caller, payee, amount, startTime, interval` |
//! | `vault_cancelPayout`    | `vault, caller, payee`                              |
//! | `vault_claimPayout`     | `vault, caller`                                     |
//! | `vault_setEpochLimit`   | `vault, caller, payee, limit, duration`             |
//! | `vault_clearEpochLimit` | `vault, caller, payee`                              |
//! | `vault_close`           | `vault, caller`                                     |
//! | `vault_getState`        | `vault`                                             |
//! | `vault_getBalance`      | `vault`                                             |
//! | `ledger_airdrop`        | `identity, amount`                                  |
//!
//! The caller is asserted by the client. Request signing happens in front of
//! this gateway, not inside it.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use payvault_contracts::custody;
use payvault_contracts::{ScheduleRequest, SledVaultStore, VaultError, VaultProgram, VaultResult, VaultState};
use payvault_protocol::{AccountKey, Clock, Identity, Ledger, LedgerDb};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Time source shared with the vault program.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// The vault program as hosted by the node.
pub type NodeProgram = VaultProgram<LedgerDb, SledVaultStore, SharedClock>;

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet").
    pub network: String,
    /// When the node started serving.
    pub started_at: DateTime<Utc>,
    /// The vault program. The mutex serializes every operation.
    pub program: Arc<Mutex<NodeProgram>>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Runs one vault operation under the program lock and records it.
    pub fn execute<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut NodeProgram) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let started = Instant::now();
        let mut program = self.program.lock();
        let result = f(&mut program);
        if result.is_ok() && matches!(operation, "initialize" | "close") {
            if let Ok(count) = program.vault_count() {
                self.metrics.vaults_open.set(count as i64);
            }
        }
        drop(program);

        self.metrics.observe(operation, &result, started.elapsed());
        result
    }

    /// Runs `f` on tokio's blocking pool. Program calls take a
    /// `parking_lot` lock and do synchronous sled I/O, neither of which
    /// may stall an async worker.
    async fn blocking<T, F>(&self, f: F) -> Result<T, tokio::task::JoinError>
    where
        T: Send + 'static,
        F: FnOnce(&AppState) -> T + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state)).await
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/vaults/:admin", get(vault_handler))
        .route("/accounts/:identity", get(account_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (named).
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// Stable application error code for each vault error kind.
pub fn vault_error_code(e: &VaultError) -> i32 {
    match e {
        VaultError::AlreadyExists(_) => -32001,
        VaultError::VaultNotFound(_) => -32002,
        VaultError::UnauthorizedAdmin { .. } => -32003,
        VaultError::UnauthorizedPayee { .. } => -32004,
        VaultError::InvalidAmount => -32005,
        VaultError::InsufficientFunds { .. } => -32006,
        VaultError::PayeeLimitReached { .. } => -32007,
        VaultError::PayeeAlreadyExists(_) => -32008,
        VaultError::InvalidPayee(_) => -32009,
        VaultError::PayeeNotFound(_) => -32010,
        VaultError::InvalidInterval(_) => -32011,
        VaultError::InvalidStartTime { .. } => -32012,
        VaultError::ScheduleAlreadyExists(_) => -32013,
        VaultError::ScheduleLimitReached { .. } => -32014,
        VaultError::ScheduleNotFound(_) => -32015,
        VaultError::PayoutTimeNotReached { .. } => -32016,
        VaultError::EpochSpendingLimitReached { .. } => -32017,
        VaultError::InvalidEpochConfig { .. } => -32018,
        VaultError::EpochLimitNotFound(_) => -32019,
        VaultError::MathOverflow => -32020,
        VaultError::Ledger(_) => -32021,
        VaultError::Store(_) => INTERNAL_ERROR,
    }
}

impl From<VaultError> for JsonRpcError {
    fn from(e: VaultError) -> Self {
        JsonRpcError {
            code: vault_error_code(&e),
            message: e.to_string(),
            data: Some(serde_json::json!({ "kind": e.kind() })),
        }
    }
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InitializeParams {
    admin: Identity,
}

#[derive(Debug, Deserialize)]
struct VaultParams {
    vault: Identity,
}

#[derive(Debug, Deserialize)]
struct CallerParams {
    vault: Identity,
    caller: Identity,
}

#[derive(Debug, Deserialize)]
struct AmountParams {
    vault: Identity,
    caller: Identity,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct PayeeParams {
    vault: Identity,
    caller: Identity,
    payee: Identity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleParams {
    vault: Identity,
    caller: Identity,
    payee: Identity,
    amount: u64,
    start_time: i64,
    interval: i64,
}

#[derive(Debug, Deserialize)]
struct EpochLimitParams {
    vault: Identity,
    caller: Identity,
    payee: Identity,
    limit: u64,
    duration: i64,
}

#[derive(Debug, Deserialize)]
struct AirdropParams {
    identity: Identity,
    amount: u64,
}

fn parse<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network identifier.
    pub network: String,
    /// Number of open vaults.
    pub vaults_open: u64,
    /// Balance floor enforced on vault debits.
    pub minimum_reserve: u64,
    /// Seconds since the node started.
    pub uptime_secs: i64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /vaults/:admin` and `vault_getState`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultResponse {
    /// Vault balance in smallest units.
    pub balance: u64,
    /// Amount that can leave the vault without breaching the reserve.
    pub spendable: u64,
    /// Full administrative record.
    pub state: VaultState,
}

/// Response payload for `GET /accounts/:identity`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    /// Base58 identity.
    pub identity: String,
    /// Wallet balance in smallest units.
    pub balance: u64,
}

/// Error payload for REST endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn vault_view(program: &NodeProgram, vault: &Identity) -> VaultResult<VaultResponse> {
    let state = program.vault_state(vault)?;
    let balance = program.vault_balance(vault)?;
    Ok(VaultResponse {
        balance,
        spendable: custody::spendable(balance, program.reserve()),
        state,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — always returns 200 with `{"status": "ok"}`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a node status summary.
async fn status_handler(State(state): State<AppState>) -> Response {
    let snapshot = state
        .blocking(|s| {
            let program = s.program.lock();
            (program.vault_count(), program.reserve())
        })
        .await;
    let (vaults_open, reserve) = match snapshot {
        Ok((Ok(count), reserve)) => (count as u64, reserve),
        Ok((Err(e), _)) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let now = Utc::now();
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        vaults_open,
        minimum_reserve: reserve,
        uptime_secs: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    })
    .into_response()
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError::new(
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
            id: req.id,
        });
    }

    let request_id = Uuid::new_v4();
    let span = tracing::debug_span!("rpc", %request_id, method = %req.method);
    let (method, params) = (req.method, req.params);
    let outcome = state
        .blocking(move |s| {
            span.in_scope(|| {
                let outcome = dispatch(s, &method, params);
                if let Err(e) = &outcome {
                    tracing::debug!(code = e.code, message = %e.message, "rpc call rejected");
                }
                outcome
            })
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(%request_id, error = %e, "rpc worker failed");
            Err(JsonRpcError::new(INTERNAL_ERROR, format!("Internal error: {}", e)))
        });

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

/// Routes one JSON-RPC method to the vault program.
fn dispatch(
    state: &AppState,
    method: &str,
    params: Option<serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    use serde_json::json;

    let value = match method {
        "vault_initialize" => {
            let p: InitializeParams = parse(params)?;
            state.execute("initialize", |vp| vp.initialize(&p.admin))?;
            json!({ "admin": p.admin })
        }
        "vault_deposit" => {
            let p: AmountParams = parse(params)?;
            let balance = state.execute("deposit", |vp| vp.deposit(&p.vault, &p.caller, p.amount))?;
            json!({ "balance": balance })
        }
        "vault_withdraw" => {
            let p: AmountParams = parse(params)?;
            let balance =
                state.execute("withdraw", |vp| vp.withdraw(&p.vault, &p.caller, p.amount))?;
            json!({ "balance": balance })
        }
        "vault_addPayee" => {
            let p: PayeeParams = parse(params)?;
            state.execute("add_payee", |vp| vp.add_payee(&p.vault, &p.caller, &p.payee))?;
            json!(true)
        }
        "vault_removePayee" => {
            let p: PayeeParams = parse(params)?;
            state.execute("remove_payee", |vp| {
                vp.remove_payee(&p.vault, &p.caller, &p.payee)
            })?;
            json!(true)
        }
        "vault_schedulePayout" => {
            let p: ScheduleParams = parse(params)?;
            let request = ScheduleRequest {
                payee: p.payee,
                amount: p.amount,
                start_time: p.start_time,
                interval: p.interval,
            };
            state.execute("schedule_payout", |vp| {
                vp.schedule_payout(&p.vault, &p.caller, request)
            })?;
            json!(true)
        }
        "vault_cancelPayout" => {
            let p: PayeeParams = parse(params)?;
            state.execute("cancel_payout", |vp| {
                vp.cancel_payout(&p.vault, &p.caller, &p.payee)
            })?;
            json!(true)
        }
        "vault_claimPayout" => {
            let p: CallerParams = parse(params)?;
            let claim = state.execute("claim_payout", |vp| vp.claim_payout(&p.vault, &p.caller))?;
            json!({
                "amount": claim.amount,
                "balance": claim.remaining_balance,
                "nextEligibleTime": claim.next_eligible_time,
            })
        }
        "vault_setEpochLimit" => {
            let p: EpochLimitParams = parse(params)?;
            state.execute("set_epoch_limit", |vp| {
                vp.set_epoch_limit(&p.vault, &p.caller, &p.payee, p.limit, p.duration)
            })?;
            json!(true)
        }
        "vault_clearEpochLimit" => {
            let p: PayeeParams = parse(params)?;
            state.execute("clear_epoch_limit", |vp| {
                vp.clear_epoch_limit(&p.vault, &p.caller, &p.payee)
            })?;
            json!(true)
        }
        "vault_close" => {
            let p: CallerParams = parse(params)?;
            let amount = state.execute("close", |vp| vp.close(&p.vault, &p.caller))?;
            json!({ "amount": amount })
        }
        "vault_getState" => {
            let p: VaultParams = parse(params)?;
            let view = vault_view(&state.program.lock(), &p.vault)?;
            serde_json::to_value(view)
                .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Internal error: {}", e)))?
        }
        "vault_getBalance" => {
            let p: VaultParams = parse(params)?;
            let balance = state.program.lock().vault_balance(&p.vault)?;
            json!(balance)
        }
        "ledger_airdrop" => {
            let p: AirdropParams = parse(params)?;
            let balance =
                state.execute("airdrop", |vp| Ok(vp.ledger_mut().airdrop(p.identity, p.amount)?))?;
            tracing::info!(identity = %p.identity, amount = p.amount, "airdrop");
            json!({ "balance": balance })
        }
        _ => {
            return Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ))
        }
    };
    Ok(value)
}

/// `GET /vaults/:admin` — vault state and balance.
async fn vault_handler(Path(admin): Path<String>, State(state): State<AppState>) -> Response {
    let admin: Identity = match admin.parse() {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let view = state
        .blocking(move |s| vault_view(&s.program.lock(), &admin))
        .await;
    match view {
        Ok(Ok(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(Err(e @ VaultError::VaultNotFound(_))) => error_response(StatusCode::NOT_FOUND, e),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /accounts/:identity` — wallet balance. Unknown wallets read as 0.
async fn account_handler(Path(identity): Path<String>, State(state): State<AppState>) -> Response {
    let identity: Identity = match identity.parse() {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let balance = state
        .blocking(move |s| s.program.lock().ledger().balance(&AccountKey::Wallet(identity)))
        .await;
    match balance {
        Ok(Ok(balance)) => Json(AccountResponse {
            identity: identity.to_base58(),
            balance,
        })
        .into_response(),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
