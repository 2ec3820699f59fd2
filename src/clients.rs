//! Narrow interfaces to the two ledgers.
//!
//! The orchestrator never talks to a network directly. It goes through
//! these traits, which are implemented by the live JSON-RPC clients in
//! `rpc` and by the in-memory [`MockLedger`](crate::mock_ledger::MockLedger).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::models::{Address, FeeKind, Network, TokenSymbol, TxHandle};
use crate::packing;
use crate::signer::EthSigner;
use crate::units::{self, UnitsError, Wei};

// ============================================================================
// RAW LEDGER TYPES (native units)
// ============================================================================

/// Fee quote in native units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub gas_fee: Wei,
    pub zkp_fee: Wei,
    pub total_fee: Wei,
}

/// Balances and nonce at one consistency level, in native units
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBalances {
    pub balances: BTreeMap<TokenSymbol, Wei>,
    pub nonce: u32,
}

/// Account snapshot as reported by the rollup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAccountState {
    pub account_id: Option<u32>,
    pub committed: RawBalances,
    pub verified: RawBalances,
}

/// Block an operation landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub committed: bool,
    pub verified: bool,
}

/// Receipt of a submitted operation as reported by the rollup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxReceipt {
    pub executed: bool,
    /// `Some(false)` once the ledger has refused the operation
    pub success: Option<bool>,
    pub fail_reason: Option<String>,
    pub block: Option<BlockInfo>,
}

impl TxReceipt {
    pub fn pending() -> Self {
        TxReceipt::default()
    }
}

// ============================================================================
// SUBMISSION REQUESTS (native, already packed)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub deposit_to: Address,
    pub token: TokenSymbol,
    pub amount: Wei,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Address,
    pub token: TokenSymbol,
    pub amount: Wei,
    pub fee: Wei,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub eth_address: Address,
    pub token: TokenSymbol,
    pub amount: Wei,
    pub fee: Wei,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePubKeyRequest {
    pub fee_token: TokenSymbol,
    pub fee: Wei,
}

// ============================================================================
// CLIENT TRAITS
// ============================================================================

/// Base-chain (settlement layer) client
#[async_trait]
pub trait BaseChainClient: Send + Sync {
    fn network(&self) -> Network;

    fn endpoint(&self) -> &str;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    async fn balance(&self, address: &Address) -> Result<Wei, ProviderError>;

    fn parse_amount(&self, decimal: &str) -> Result<Wei, UnitsError> {
        units::parse_ether(decimal)
    }

    fn format_amount(&self, wei: Wei) -> Result<Decimal, UnitsError> {
        units::format_ether(wei)
    }
}

/// Rollup (layer-2) provider: queries plus wallet construction
#[async_trait]
pub trait RollupProvider: Send + Sync {
    fn network(&self) -> Network;

    fn endpoint(&self) -> &str;

    async fn transaction_fee(
        &self,
        kind: FeeKind,
        address: &Address,
        token: &TokenSymbol,
    ) -> Result<FeeQuote, ProviderError>;

    async fn account_state(&self, address: &Address) -> Result<RawAccountState, ProviderError>;

    /// Current receipt of a submitted operation
    async fn receipt(&self, handle: &TxHandle) -> Result<TxReceipt, ProviderError>;

    /// Bind a base-chain signer to its rollup wallet
    fn open_wallet(&self, signer: Arc<dyn EthSigner>) -> Result<Arc<dyn RollupWallet>, ProviderError>;

    fn closest_packable_amount(&self, amount: Wei) -> Wei {
        packing::closest_packable_amount(amount)
    }

    fn closest_packable_fee(&self, fee: Wei) -> Wei {
        packing::closest_packable_fee(fee)
    }
}

/// Signing wallet of one rollup account
#[async_trait]
pub trait RollupWallet: Send + Sync {
    fn address(&self) -> Address;

    async fn is_signing_key_set(&self) -> Result<bool, ProviderError>;

    async fn account_id(&self) -> Result<Option<u32>, ProviderError>;

    async fn account_state(&self) -> Result<RawAccountState, ProviderError>;

    async fn set_signing_key(&self, request: ChangePubKeyRequest) -> Result<TxHandle, ProviderError>;

    async fn deposit(&self, request: DepositRequest) -> Result<TxHandle, ProviderError>;

    async fn transfer(&self, request: TransferRequest) -> Result<TxHandle, ProviderError>;

    async fn withdraw(&self, request: WithdrawRequest) -> Result<TxHandle, ProviderError>;
}
