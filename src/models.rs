//! Core data model shared by the orchestrator, the ledger clients and the
//! HTTP host: networks, addresses, tokens, operations, stages and receipts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// NETWORK
// ============================================================================

/// A named deployment of the base chain and its rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Goerli,
    Sepolia,
    Rinkeby,
    Localhost,
}

impl Network {
    /// Resolve a network from its (case-insensitive) name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mainnet" | "homestead" => Some(Network::Mainnet),
            "goerli" => Some(Network::Goerli),
            "sepolia" => Some(Network::Sepolia),
            "rinkeby" => Some(Network::Rinkeby),
            "localhost" | "local" => Some(Network::Localhost),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Goerli => "goerli",
            Network::Sepolia => "sepolia",
            Network::Rinkeby => "rinkeby",
            Network::Localhost => "localhost",
        }
    }

    /// EIP-155 chain id of the base chain
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Goerli => 5,
            Network::Sepolia => 11_155_111,
            Network::Rinkeby => 4,
            Network::Localhost => 9,
        }
    }

    pub fn default_base_chain_endpoint(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://cloudflare-eth.com",
            Network::Goerli => "https://rpc.ankr.com/eth_goerli",
            Network::Sepolia => "https://rpc.sepolia.org",
            Network::Rinkeby => "https://rpc.ankr.com/eth_rinkeby",
            Network::Localhost => "http://127.0.0.1:8545",
        }
    }

    pub fn default_rollup_endpoint(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.zksync.io/jsrpc",
            Network::Goerli => "https://goerli-api.zksync.io/jsrpc",
            Network::Sepolia => "https://sepolia-api.zksync.io/jsrpc",
            Network::Rinkeby => "https://rinkeby-api.zksync.io/jsrpc",
            Network::Localhost => "http://127.0.0.1:3030",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ADDRESS & TOKEN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address '{0}': expected 0x followed by 40 hex characters")]
pub struct ParseAddressError(pub String);

/// A 20-byte account address, shared by the base chain and the rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ParseAddressError(s.to_string()))?;
        if hex_part.len() != 40 {
            return Err(ParseAddressError(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Address(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = ParseAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Ticker of a rollup asset. Always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TokenSymbol(String);

impl TokenSymbol {
    pub fn new(symbol: &str) -> Self {
        TokenSymbol(symbol.trim().to_uppercase())
    }

    pub fn eth() -> Self {
        TokenSymbol("ETH".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TokenSymbol {
    fn from(value: String) -> Self {
        TokenSymbol::new(&value)
    }
}

impl From<&str> for TokenSymbol {
    fn from(value: &str) -> Self {
        TokenSymbol::new(value)
    }
}

impl From<TokenSymbol> for String {
    fn from(token: TokenSymbol) -> Self {
        token.0
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// FEES
// ============================================================================

/// Transaction kinds the rollup can quote a fee for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeeKind {
    Transfer,
    Withdraw,
    FastWithdraw,
    ChangePubKey,
}

impl FeeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "transfer" => Some(FeeKind::Transfer),
            "withdraw" => Some(FeeKind::Withdraw),
            "fastwithdraw" | "fast_withdraw" => Some(FeeKind::FastWithdraw),
            "changepubkey" | "change_pub_key" => Some(FeeKind::ChangePubKey),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeKind::Transfer => "Transfer",
            FeeKind::Withdraw => "Withdraw",
            FeeKind::FastWithdraw => "FastWithdraw",
            FeeKind::ChangePubKey => "ChangePubKey",
        }
    }
}

impl fmt::Display for FeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STAGES
// ============================================================================

/// Observable lifecycle stage of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Accepted by the ledger, not yet included in a block
    Submitted,
    /// Included in a committed block
    Committed,
    /// Withdrawal included, waiting for the block proof
    PendingVerification,
    /// Block proof accepted on the base chain
    Verified,
    /// Refused by the ledger after submission
    Rejected,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Submitted => "submitted",
            Stage::Committed => "committed",
            Stage::PendingVerification => "pending_verification",
            Stage::Verified => "verified",
            Stage::Rejected => "rejected",
        }
    }

    /// Whether `self` satisfies a wait that targets `target`
    pub fn reaches(&self, target: Stage) -> bool {
        match target {
            Stage::Committed => matches!(self, Stage::Committed | Stage::Verified),
            Stage::Verified => matches!(self, Stage::Verified),
            other => *self == other,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Deposit,
    Transfer,
    Withdraw,
    Authorize,
    FeeQuery,
    BalanceQuery,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Transfer => "transfer",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Authorize => "authorize",
            OperationKind::FeeQuery => "fee_query",
            OperationKind::BalanceQuery => "balance_query",
        }
    }

    /// Stage a submission of this kind must reach before it is done.
    /// Read-only kinds never submit and have no target.
    pub fn target_stage(&self) -> Option<Stage> {
        match self {
            OperationKind::Deposit | OperationKind::Transfer | OperationKind::Authorize => {
                Some(Stage::Committed)
            }
            OperationKind::Withdraw => Some(Stage::Verified),
            OperationKind::FeeQuery | OperationKind::BalanceQuery => None,
        }
    }

    pub fn packs_fee(&self) -> bool {
        matches!(self, OperationKind::Transfer | OperationKind::Withdraw | OperationKind::Authorize)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to the orchestrator. Amounts are ether-scale decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Deposit {
        /// Rollup recipient; the depositor's own address when absent
        #[serde(default)]
        to: Option<Address>,
        token: TokenSymbol,
        amount: Decimal,
    },
    Transfer {
        to: Address,
        token: TokenSymbol,
        amount: Decimal,
        #[serde(default)]
        fee: Option<Decimal>,
    },
    Withdraw {
        /// Base-chain recipient; the withdrawer's own address when absent
        #[serde(default)]
        to: Option<Address>,
        token: TokenSymbol,
        amount: Decimal,
        #[serde(default)]
        fee: Option<Decimal>,
    },
    Authorize,
    FeeQuery {
        kind: FeeKind,
        to: Address,
        token: TokenSymbol,
    },
    BalanceQuery {
        #[serde(default)]
        tokens: Vec<TokenSymbol>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Deposit { .. } => OperationKind::Deposit,
            Operation::Transfer { .. } => OperationKind::Transfer,
            Operation::Withdraw { .. } => OperationKind::Withdraw,
            Operation::Authorize => OperationKind::Authorize,
            Operation::FeeQuery { .. } => OperationKind::FeeQuery,
            Operation::BalanceQuery { .. } => OperationKind::BalanceQuery,
        }
    }
}

// ============================================================================
// HANDLES & RECEIPTS
// ============================================================================

/// Ledger-assigned identifier of a submitted operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TxHandle {
    /// Rollup transaction hash (`sync-tx:<hex>`)
    Tx(String),
    /// Serial id of a base-chain priority operation (deposits)
    PriorityOp(u64),
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxHandle::Tx(hash) => f.write_str(hash),
            TxHandle::PriorityOp(serial) => write!(f, "priority-op:{}", serial),
        }
    }
}

/// Result of a submitted operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReceipt {
    pub id: Uuid,
    pub kind: OperationKind,
    pub tx: TxHandle,
    pub stage: Stage,
    /// Packed amount actually submitted
    pub amount: Option<Decimal>,
    /// Packed fee actually submitted
    pub fee: Option<Decimal>,
    pub block: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OperationReceipt {
    pub fn new(kind: OperationKind, tx: TxHandle, amount: Option<Decimal>, fee: Option<Decimal>) -> Self {
        OperationReceipt {
            id: Uuid::new_v4(),
            kind,
            tx,
            stage: Stage::Submitted,
            amount,
            fee,
            block: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.stage {
            Stage::Rejected => true,
            stage => self.kind.target_stage().map_or(false, |target| stage.reaches(target)),
        }
    }

    /// Move to a later stage. Terminal receipts are frozen.
    pub fn advance(&mut self, stage: Stage, block: Option<u64>) {
        if self.is_terminal() {
            return;
        }
        self.stage = stage;
        if block.is_some() {
            self.block = block;
        }
        if self.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn reject(&mut self, reason: String) {
        if self.is_terminal() {
            return;
        }
        self.stage = Stage::Rejected;
        self.error = Some(reason);
        self.completed_at = Some(Utc::now());
    }
}

// ============================================================================
// ACCOUNT STATE
// ============================================================================

/// Balances at one consistency level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balances: BTreeMap<TokenSymbol, Decimal>,
    pub nonce: u32,
}

impl BalanceSnapshot {
    /// Balance of `token`; an absent entry is zero
    pub fn balance(&self, token: &TokenSymbol) -> Decimal {
        self.balances.get(token).copied().unwrap_or(Decimal::ZERO)
    }

    /// Make sure every listed token has an entry
    pub fn fill_zero(&mut self, tokens: &[TokenSymbol]) {
        for token in tokens {
            self.balances.entry(token.clone()).or_insert(Decimal::ZERO);
        }
    }
}

/// Committed and verified view of one rollup account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: Address,
    pub account_id: Option<u32>,
    pub committed: BalanceSnapshot,
    pub verified: BalanceSnapshot,
}

impl AccountState {
    /// Lines in the form `Committed ETH balance for 0x..: 1.5`
    pub fn balance_report(&self, token: &TokenSymbol) -> [String; 2] {
        [
            format!(
                "Committed {} balance for {}: {}",
                token,
                self.address,
                self.committed.balance(token)
            ),
            format!(
                "Verified {} balance for {}: {}",
                token,
                self.address,
                self.verified.balance(token)
            ),
        ]
    }
}

// ============================================================================
// TESTS
// ============================================================================
