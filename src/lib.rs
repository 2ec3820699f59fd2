/// zkBridge - transaction lifecycle orchestration between an Ethereum base
/// chain and a zkSync-style rollup
/// Exports all modules for use as a library crate

pub mod account;
pub mod app_state;
pub mod clients;
pub mod config;
pub mod connect;
pub mod error;
pub mod handlers;
pub mod mock_ledger;
pub mod models;
pub mod orchestrator;
pub mod packing;
pub mod signer;
pub mod units;

#[path = "../rpc/mod.rs"]
pub mod rpc;

pub use account::{derive_account, Account, KeyStatus};
pub use app_state::{AppState, SharedState};
pub use clients::{BaseChainClient, FeeQuote, RollupProvider, RollupWallet, TxReceipt};
pub use config::{Config, Endpoint};
pub use connect::{connect, connect_base_chain, connect_rollup, Clients};
pub use error::{OrchestratorError, ProviderError};
pub use mock_ledger::{MockLedger, SubmissionRecord};
pub use models::{
    AccountState, Address, BalanceSnapshot, FeeKind, Network, Operation, OperationKind, OperationReceipt, Stage,
    TokenSymbol, TxHandle,
};
pub use orchestrator::{deadline_after, ConfirmationPolicy, OperationOutcome, Orchestrator};
pub use signer::{test_accounts, EthSigner, LocalSigner, TestAccount};
pub use units::Wei;

use axum::{
    routing::{get, post},
    Router,
};

/// HTTP routes of the host service
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .route("/accounts", get(handlers::list_accounts))
        .route("/accounts/:name/state", get(handlers::get_account_state))
        .route("/fee", post(handlers::estimate_fee))
        .route("/deposit", post(handlers::deposit))
        .route("/transfer", post(handlers::transfer))
        .route("/withdraw", post(handlers::withdraw))
        .route("/authorize", post(handlers::authorize))
        .with_state(state)
}
