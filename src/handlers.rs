// HTTP request handlers for the bridge API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::account::Account;
use crate::app_state::SharedState;
use crate::clients::{BaseChainClient, RollupProvider};
use crate::error::OrchestratorError;
use crate::models::{FeeKind, Operation, TokenSymbol};
use crate::orchestrator::{deadline_after, OperationOutcome};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

// ===== REQUEST TYPES =====

#[derive(Debug, Deserialize)]
pub struct DepositBody {
    pub account: String,
    pub to: Option<String>,
    #[serde(default = "default_token")]
    pub token: String,
    pub amount: Decimal,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub account: String,
    pub to: String,
    #[serde(default = "default_token")]
    pub token: String,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawBody {
    pub account: String,
    pub to: Option<String>,
    #[serde(default = "default_token")]
    pub token: String,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    pub account: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FeeBody {
    pub kind: String,
    pub to: String,
    #[serde(default = "default_token")]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct StateParams {
    /// Comma-separated token symbols
    pub tokens: Option<String>,
}

fn default_token() -> String {
    "ETH".to_string()
}

// ===== ERROR MAPPING =====

pub fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::InvalidAmount(_) | OrchestratorError::Config(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::UnknownAccount(_) => StatusCode::NOT_FOUND,
        OrchestratorError::SigningKeyNotSet(_) => StatusCode::CONFLICT,
        OrchestratorError::Estimation { .. } | OrchestratorError::Confirmation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OrchestratorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        OrchestratorError::Submission { .. } | OrchestratorError::Query(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(err: OrchestratorError) -> (StatusCode, Json<Value>) {
    let status = status_for(&err);
    warn!(code = err.code(), error = %err, "request failed");

    let mut body = json!({
        "success": false,
        "code": err.code(),
        "error": err.to_string(),
    });
    if let Some(stage) = err.stage() {
        body["stage"] = json!(stage);
    }
    if let OrchestratorError::Timeout { tx, .. } | OrchestratorError::Confirmation { tx, .. } = &err {
        body["tx"] = json!(tx.to_string());
    }
    (status, Json(body))
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "code": "bad_request", "error": message })),
    )
}

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "code": "not_found", "error": format!("unknown account {}", what) })),
    )
}

// ===== HELPERS =====

fn lookup_account(state: &SharedState, name: &str) -> Result<Arc<Account>, (StatusCode, Json<Value>)> {
    state.account(name).ok_or_else(|| not_found(name))
}

fn deadline(timeout_secs: Option<u64>) -> Option<Instant> {
    timeout_secs.and_then(|secs| deadline_after(Duration::from_secs(secs)))
}

async fn run(state: &SharedState, account: &Account, operation: Operation, deadline: Option<Instant>) -> ApiResult {
    let outcome = state
        .orchestrator
        .execute(account, operation, deadline)
        .await
        .map_err(error_response)?;

    let body = match outcome {
        OperationOutcome::Receipt(receipt) => json!({ "success": true, "receipt": receipt }),
        OperationOutcome::AlreadyRegistered => json!({ "success": true, "already_registered": true }),
        OperationOutcome::Fee { amount } => json!({ "success": true, "fee": amount }),
        OperationOutcome::State(account_state) => json!({ "success": true, "state": account_state }),
    };
    Ok(Json(body))
}

// ===== HEALTH =====

pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "network": state.network(),
        "mock": state.is_mock(),
        "base_chain": state.orchestrator.base().endpoint(),
        "rollup": state.orchestrator.rollup().endpoint(),
    }))
}

// ===== ACCOUNTS =====

pub async fn list_accounts(State(state): State<SharedState>) -> Json<Value> {
    let accounts: Vec<Value> = state
        .accounts
        .iter()
        .map(|(name, account)| {
            json!({
                "name": name,
                "address": account.address().to_string(),
                "key_status": account.key_status(),
            })
        })
        .collect();
    Json(json!({ "accounts": accounts }))
}

/// GET /accounts/:name/state?tokens=ETH,USDC
pub async fn get_account_state(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(params): Query<StateParams>,
) -> ApiResult {
    let account = lookup_account(&state, &name)?;
    let tokens: Vec<TokenSymbol> = params
        .tokens
        .unwrap_or_else(default_token)
        .split(',')
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .map(TokenSymbol::new)
        .collect();

    let account_state = state
        .orchestrator
        .account_state(&account, &tokens)
        .await
        .map_err(error_response)?;
    let base_balance = state
        .orchestrator
        .base_balance(&account.address())
        .await
        .map_err(error_response)?;

    Ok(Json(json!({
        "success": true,
        "state": account_state,
        "base_chain_balance": base_balance,
        "key_status": account.key_status(),
    })))
}

// ===== FEES =====

pub async fn estimate_fee(State(state): State<SharedState>, Json(body): Json<FeeBody>) -> ApiResult {
    let kind = FeeKind::from_name(&body.kind).ok_or_else(|| bad_request(format!("unknown fee kind {}", body.kind)))?;
    let to = state
        .resolve_address(&body.to)
        .ok_or_else(|| bad_request(format!("invalid recipient {}", body.to)))?;

    let fee = state
        .orchestrator
        .estimate_fee(kind, &to, &TokenSymbol::new(&body.token))
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true, "kind": kind, "token": body.token.to_uppercase(), "fee": fee })))
}

// ===== FUND MOVEMENT =====

pub async fn deposit(State(state): State<SharedState>, Json(body): Json<DepositBody>) -> ApiResult {
    let account = lookup_account(&state, &body.account)?;
    let to = match &body.to {
        Some(to) => Some(
            state
                .resolve_address(to)
                .ok_or_else(|| bad_request(format!("invalid recipient {}", to)))?,
        ),
        None => None,
    };
    let operation = Operation::Deposit {
        to,
        token: TokenSymbol::new(&body.token),
        amount: body.amount,
    };
    run(&state, &account, operation, deadline(body.timeout_secs)).await
}

pub async fn transfer(State(state): State<SharedState>, Json(body): Json<TransferBody>) -> ApiResult {
    let account = lookup_account(&state, &body.account)?;
    let to = state
        .resolve_address(&body.to)
        .ok_or_else(|| bad_request(format!("invalid recipient {}", body.to)))?;
    let operation = Operation::Transfer {
        to,
        token: TokenSymbol::new(&body.token),
        amount: body.amount,
        fee: body.fee,
    };
    run(&state, &account, operation, deadline(body.timeout_secs)).await
}

pub async fn withdraw(State(state): State<SharedState>, Json(body): Json<WithdrawBody>) -> ApiResult {
    let account = lookup_account(&state, &body.account)?;
    let to = match &body.to {
        Some(to) => Some(
            state
                .resolve_address(to)
                .ok_or_else(|| bad_request(format!("invalid recipient {}", to)))?,
        ),
        None => None,
    };
    let operation = Operation::Withdraw {
        to,
        token: TokenSymbol::new(&body.token),
        amount: body.amount,
        fee: body.fee,
    };
    run(&state, &account, operation, deadline(body.timeout_secs)).await
}

// ===== KEY AUTHORIZATION =====

pub async fn authorize(State(state): State<SharedState>, Json(body): Json<AuthorizeBody>) -> ApiResult {
    let account = lookup_account(&state, &body.account)?;
    run(&state, &account, Operation::Authorize, deadline(body.timeout_secs)).await
}
