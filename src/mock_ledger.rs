//! In-memory rollup and base chain ("mock mode")
//!
//! `MockLedger` implements both ledger traits so the orchestrator can run
//! without a live network. Block production is under the caller's control:
//! submissions wait in a pending queue until `commit_pending()` seals them
//! into a block and `verify_pending()` proves that block, unless auto-commit
//! or auto-verify is switched on.
//!
//! Effects follow the rollup's rules:
//! - ETH deposits leave the base chain on submission and credit the rollup on commit
//! - transfers debit amount + fee on commit, or are rejected there when the
//!   spendable committed balance cannot cover them
//! - withdrawals reserve amount + fee on commit and debit both balance
//!   levels only once verified; ETH withdrawals then credit the base chain
//! - an account gets its numeric id the first time it is credited

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::clients::{
    BaseChainClient, BlockInfo, ChangePubKeyRequest, DepositRequest, FeeQuote, RawAccountState,
    RawBalances, RollupProvider, RollupWallet, TransferRequest, TxReceipt, WithdrawRequest,
};
use crate::error::ProviderError;
use crate::models::{Address, FeeKind, Network, OperationKind, TokenSymbol, TxHandle};
use crate::signer::EthSigner;
use crate::units::Wei;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default fee table: (kind, token, gas fee, zkp fee) in wei
const DEFAULT_FEES: [(FeeKind, &str, Wei, Wei); 6] = [
    (FeeKind::Transfer, "ETH", 80_000_000_000_000, 20_000_000_000_000),
    (FeeKind::Withdraw, "ETH", 400_000_000_000_000, 100_000_000_000_000),
    (FeeKind::FastWithdraw, "ETH", 900_000_000_000_000, 100_000_000_000_000),
    (FeeKind::ChangePubKey, "ETH", 250_000_000_000_000, 50_000_000_000_000),
    (FeeKind::Transfer, "USDC", 80_000_000_000_000, 20_000_000_000_000),
    (FeeKind::Withdraw, "USDC", 400_000_000_000_000, 100_000_000_000_000),
];

// ============================================================================
// RECORDS
// ============================================================================

/// One submission as seen by the ledger, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub handle: TxHandle,
    pub kind: OperationKind,
    pub from: Address,
    pub to: Address,
    pub token: TokenSymbol,
    pub amount: Wei,
    pub fee: Wei,
    pub nonce: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpStatus {
    Pending,
    Committed(u64),
    Verified(u64),
    Rejected,
}

#[derive(Debug, Clone)]
struct OpRecord {
    submission: SubmissionRecord,
    status: OpStatus,
    /// Rejection decided at submission, applied when the block is sealed
    forced_reject: Option<String>,
    fail_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct MockAccount {
    id: u32,
    committed: BTreeMap<TokenSymbol, Wei>,
    verified: BTreeMap<TokenSymbol, Wei>,
    /// Committed withdrawals awaiting their proof
    reserved: BTreeMap<TokenSymbol, Wei>,
    committed_nonce: u32,
    verified_nonce: u32,
    key_committed: bool,
}

#[derive(Debug)]
struct MockState {
    auto_commit: bool,
    auto_verify: bool,
    submit_latency: Duration,
    reject_next: Option<String>,
    accounts: HashMap<Address, MockAccount>,
    base_balances: HashMap<Address, Wei>,
    /// Nonce the next rollup transaction of an address will carry
    next_nonce: HashMap<Address, u32>,
    fees: BTreeMap<(FeeKind, TokenSymbol), FeeQuote>,
    ops: HashMap<TxHandle, OpRecord>,
    order: Vec<TxHandle>,
    next_account_id: u32,
    next_serial: u64,
    next_block: u64,
}

// ============================================================================
// MOCK LEDGER
// ============================================================================

/// Shared handle to one simulated rollup and its base chain
#[derive(Debug, Clone)]
pub struct MockLedger {
    network: Network,
    endpoint: String,
    state: Arc<Mutex<MockState>>,
}

impl MockLedger {
    pub fn new(network: Network) -> Self {
        let fees = DEFAULT_FEES
            .iter()
            .map(|(kind, token, gas_fee, zkp_fee)| {
                (
                    (*kind, TokenSymbol::new(token)),
                    FeeQuote {
                        gas_fee: *gas_fee,
                        zkp_fee: *zkp_fee,
                        total_fee: gas_fee + zkp_fee,
                    },
                )
            })
            .collect();

        MockLedger {
            network,
            endpoint: format!("mock://{}", network),
            state: Arc::new(Mutex::new(MockState {
                auto_commit: false,
                auto_verify: false,
                submit_latency: Duration::ZERO,
                reject_next: None,
                accounts: HashMap::new(),
                base_balances: HashMap::new(),
                next_nonce: HashMap::new(),
                fees,
                ops: HashMap::new(),
                order: Vec::new(),
                next_account_id: 1,
                next_serial: 0,
                next_block: 1,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // CONTROL
    // ========================================================================

    /// Seal every submission into a block as soon as it arrives
    pub fn set_auto_commit(&self, enabled: bool) {
        self.state().auto_commit = enabled;
    }

    /// Prove every committed block immediately (implies auto-commit)
    pub fn set_auto_verify(&self, enabled: bool) {
        let mut state = self.state();
        state.auto_verify = enabled;
        if enabled {
            state.auto_commit = true;
        }
    }

    /// Delay applied inside every submission call
    pub fn set_submit_latency(&self, latency: Duration) {
        self.state().submit_latency = latency;
    }

    /// Accept the next submission, then reject it when its block is sealed
    pub fn reject_next_submission(&self, reason: &str) {
        self.state().reject_next = Some(reason.to_string());
    }

    pub fn set_fee(&self, kind: FeeKind, token: &TokenSymbol, quote: FeeQuote) {
        self.state().fees.insert((kind, token.clone()), quote);
    }

    pub fn remove_fee(&self, kind: FeeKind, token: &TokenSymbol) {
        self.state().fees.remove(&(kind, token.clone()));
    }

    /// Credit the base chain directly
    pub fn fund_base(&self, address: &Address, amount: Wei) {
        *self.state().base_balances.entry(*address).or_insert(0) += amount;
    }

    /// Credit a rollup account directly at both consistency levels, as if
    /// an earlier deposit had been verified
    pub fn fund_rollup(&self, address: &Address, token: &TokenSymbol, amount: Wei) {
        let mut state = self.state();
        let account = state.account_mut(address);
        *account.committed.entry(token.clone()).or_insert(0) += amount;
        *account.verified.entry(token.clone()).or_insert(0) += amount;
    }

    /// Mark the signing key of an existing account as registered without a
    /// submission
    pub fn register_key(&self, address: &Address) {
        let mut state = self.state();
        state.account_mut(address).key_committed = true;
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|handle| state.ops.get(handle).map(|op| op.submission.clone()))
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.state().order.len()
    }

    pub fn base_balance(&self, address: &Address) -> Wei {
        self.state().base_balances.get(address).copied().unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        let state = self.state();
        state
            .ops
            .values()
            .filter(|op| op.status == OpStatus::Pending)
            .count()
    }

    // ========================================================================
    // BLOCK PRODUCTION
    // ========================================================================

    /// Seal all pending submissions into one block, in arrival order.
    /// Returns the number of operations included (rejected ones excluded).
    pub fn commit_pending(&self) -> usize {
        self.state().commit_pending()
    }

    /// Prove every committed block. Returns the number of operations verified.
    pub fn verify_pending(&self) -> usize {
        self.state().verify_pending()
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    async fn submit(&self, mut record: SubmissionRecord) -> Result<TxHandle, ProviderError> {
        let latency = self.state().submit_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.precheck(&record)?;

        if record.kind != OperationKind::Deposit {
            let nonce = state.next_nonce.entry(record.from).or_insert(0);
            record.nonce = Some(*nonce);
            *nonce += 1;
        }

        let handle = match record.kind {
            OperationKind::Deposit => {
                let serial = state.next_serial;
                state.next_serial += 1;
                if record.token == TokenSymbol::eth() {
                    let base = state.base_balances.entry(record.from).or_insert(0);
                    *base -= record.amount;
                }
                TxHandle::PriorityOp(serial)
            }
            _ => TxHandle::Tx(tx_hash(&record)),
        };
        record.handle = handle.clone();

        let forced_reject = state.reject_next.take();
        info!(
            kind = %record.kind,
            from = %record.from,
            tx = %handle,
            amount = record.amount,
            "mock ledger accepted submission"
        );
        state.ops.insert(
            handle.clone(),
            OpRecord {
                submission: record,
                status: OpStatus::Pending,
                forced_reject,
                fail_reason: None,
            },
        );
        state.order.push(handle.clone());

        if state.auto_commit {
            state.commit_pending();
        }
        if state.auto_verify {
            state.verify_pending();
        }
        Ok(handle)
    }
}

fn tx_hash(record: &SubmissionRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.kind.as_str().as_bytes());
    hasher.update(record.from.as_bytes());
    hasher.update(record.to.as_bytes());
    hasher.update(record.nonce.unwrap_or_default().to_be_bytes());
    hasher.update(record.amount.to_be_bytes());
    format!("sync-tx:{}", hex::encode(hasher.finalize()))
}

impl MockState {
    fn account_mut(&mut self, address: &Address) -> &mut MockAccount {
        let next_id = &mut self.next_account_id;
        self.accounts.entry(*address).or_insert_with(|| {
            let account = MockAccount {
                id: *next_id,
                ..MockAccount::default()
            };
            *next_id += 1;
            account
        })
    }

    /// Checks the live ledger performs synchronously on submission
    fn precheck(&self, record: &SubmissionRecord) -> Result<(), ProviderError> {
        match record.kind {
            OperationKind::Deposit if record.token == TokenSymbol::eth() => {
                let available = self.base_balances.get(&record.from).copied().unwrap_or(0);
                if available < record.amount {
                    return Err(ProviderError::Rejected(format!(
                        "insufficient base-chain balance: have {}, need {}",
                        available, record.amount
                    )));
                }
            }
            OperationKind::Deposit => {}
            OperationKind::Authorize => {
                if !self.accounts.contains_key(&record.from) {
                    return Err(ProviderError::Rejected("account does not exist".into()));
                }
            }
            OperationKind::Transfer | OperationKind::Withdraw => {
                let key_set = self
                    .accounts
                    .get(&record.from)
                    .map(|account| account.key_committed)
                    .unwrap_or(false);
                if !key_set {
                    return Err(ProviderError::Rejected("signing key is not set".into()));
                }
            }
            OperationKind::FeeQuery | OperationKind::BalanceQuery => {
                return Err(ProviderError::Unsupported(format!("{} is not a submission", record.kind)));
            }
        }
        Ok(())
    }

    fn commit_pending(&mut self) -> usize {
        let pending: Vec<TxHandle> = self
            .order
            .iter()
            .filter(|handle| {
                self.ops
                    .get(*handle)
                    .map(|op| op.status == OpStatus::Pending)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let block = self.next_block;
        self.next_block += 1;
        let mut included = 0;

        for handle in pending {
            let (submission, forced_reject) = match self.ops.get(&handle) {
                Some(op) => (op.submission.clone(), op.forced_reject.clone()),
                None => continue,
            };
            let outcome = match forced_reject {
                Some(reason) => Err(reason),
                None => self.apply_committed(&submission),
            };
            if let Some(op) = self.ops.get_mut(&handle) {
                match outcome {
                    Ok(()) => {
                        op.status = OpStatus::Committed(block);
                        included += 1;
                    }
                    Err(reason) => {
                        debug!(tx = %handle, %reason, "mock ledger rejected operation");
                        op.status = OpStatus::Rejected;
                        op.fail_reason = Some(reason);
                    }
                }
            }
        }
        debug!(block, included, "mock ledger committed block");
        included
    }

    fn apply_committed(&mut self, sub: &SubmissionRecord) -> Result<(), String> {
        match sub.kind {
            OperationKind::Deposit => {
                let account = self.account_mut(&sub.to);
                *account.committed.entry(sub.token.clone()).or_insert(0) += sub.amount;
            }
            OperationKind::Transfer | OperationKind::Withdraw => {
                let needed = sub.amount + sub.fee;
                let sender = self.account_mut(&sub.from);
                let balance = sender.committed.get(&sub.token).copied().unwrap_or(0);
                let reserved = sender.reserved.get(&sub.token).copied().unwrap_or(0);
                let available = balance.saturating_sub(reserved);
                if available < needed {
                    return Err(format!(
                        "insufficient {} balance: have {}, need {}",
                        sub.token, available, needed
                    ));
                }
                sender.committed_nonce += 1;
                if sub.kind == OperationKind::Transfer {
                    sender.committed.insert(sub.token.clone(), balance - needed);
                    let recipient = self.account_mut(&sub.to);
                    *recipient.committed.entry(sub.token.clone()).or_insert(0) += sub.amount;
                } else {
                    sender.reserved.insert(sub.token.clone(), reserved + needed);
                }
            }
            OperationKind::Authorize => {
                let account = self.account_mut(&sub.from);
                let available = account.committed.get(&sub.token).copied().unwrap_or(0);
                if available < sub.fee {
                    return Err(format!("insufficient {} balance for fee", sub.token));
                }
                account.committed.insert(sub.token.clone(), available - sub.fee);
                account.committed_nonce += 1;
                account.key_committed = true;
            }
            OperationKind::FeeQuery | OperationKind::BalanceQuery => {}
        }
        Ok(())
    }

    fn verify_pending(&mut self) -> usize {
        let committed: Vec<(TxHandle, u64)> = self
            .order
            .iter()
            .filter_map(|handle| match self.ops.get(handle).map(|op| op.status) {
                Some(OpStatus::Committed(block)) => Some((handle.clone(), block)),
                _ => None,
            })
            .collect();

        for (handle, block) in &committed {
            let submission = match self.ops.get(handle) {
                Some(op) => op.submission.clone(),
                None => continue,
            };
            self.apply_verified(&submission);
            if let Some(op) = self.ops.get_mut(handle) {
                op.status = OpStatus::Verified(*block);
            }
        }
        committed.len()
    }

    fn apply_verified(&mut self, sub: &SubmissionRecord) {
        match sub.kind {
            OperationKind::Deposit => {
                let account = self.account_mut(&sub.to);
                *account.verified.entry(sub.token.clone()).or_insert(0) += sub.amount;
            }
            OperationKind::Transfer | OperationKind::Withdraw => {
                let needed = sub.amount + sub.fee;
                let sender = self.account_mut(&sub.from);
                let balance = sender.verified.entry(sub.token.clone()).or_insert(0);
                *balance = balance.saturating_sub(needed);
                sender.verified_nonce += 1;
                if sub.kind == OperationKind::Withdraw {
                    let committed = sender.committed.entry(sub.token.clone()).or_insert(0);
                    *committed = committed.saturating_sub(needed);
                    let reserved = sender.reserved.entry(sub.token.clone()).or_insert(0);
                    *reserved = reserved.saturating_sub(needed);
                }
                if sub.kind == OperationKind::Transfer {
                    let recipient = self.account_mut(&sub.to);
                    *recipient.verified.entry(sub.token.clone()).or_insert(0) += sub.amount;
                } else if sub.token == TokenSymbol::eth() {
                    *self.base_balances.entry(sub.to).or_insert(0) += sub.amount;
                }
            }
            OperationKind::Authorize => {
                let account = self.account_mut(&sub.from);
                let balance = account.verified.entry(sub.token.clone()).or_insert(0);
                *balance = balance.saturating_sub(sub.fee);
                account.verified_nonce += 1;
            }
            OperationKind::FeeQuery | OperationKind::BalanceQuery => {}
        }
    }

    fn raw_state(&self, address: &Address) -> RawAccountState {
        match self.accounts.get(address) {
            Some(account) => RawAccountState {
                account_id: Some(account.id),
                committed: RawBalances {
                    balances: account.committed.clone(),
                    nonce: account.committed_nonce,
                },
                verified: RawBalances {
                    balances: account.verified.clone(),
                    nonce: account.verified_nonce,
                },
            },
            None => RawAccountState::default(),
        }
    }
}

// ============================================================================
// TRAIT IMPLEMENTATIONS
// ============================================================================

#[async_trait]
impl BaseChainClient for MockLedger {
    fn network(&self) -> Network {
        self.network
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.network.chain_id())
    }

    async fn balance(&self, address: &Address) -> Result<Wei, ProviderError> {
        Ok(self.base_balance(address))
    }
}

#[async_trait]
impl RollupProvider for MockLedger {
    fn network(&self) -> Network {
        self.network
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn transaction_fee(
        &self,
        kind: FeeKind,
        _address: &Address,
        token: &TokenSymbol,
    ) -> Result<FeeQuote, ProviderError> {
        self.state()
            .fees
            .get(&(kind, token.clone()))
            .copied()
            .ok_or_else(|| ProviderError::Unsupported(format!("{} fee in {}", kind, token)))
    }

    async fn account_state(&self, address: &Address) -> Result<RawAccountState, ProviderError> {
        Ok(self.state().raw_state(address))
    }

    async fn receipt(&self, handle: &TxHandle) -> Result<TxReceipt, ProviderError> {
        let state = self.state();
        let op = state.ops.get(handle).ok_or_else(|| ProviderError::Rpc {
            code: -32602,
            message: format!("unknown operation {}", handle),
        })?;

        Ok(match op.status {
            OpStatus::Pending => TxReceipt::pending(),
            OpStatus::Committed(number) => TxReceipt {
                executed: true,
                success: Some(true),
                fail_reason: None,
                block: Some(BlockInfo { number, committed: true, verified: false }),
            },
            OpStatus::Verified(number) => TxReceipt {
                executed: true,
                success: Some(true),
                fail_reason: None,
                block: Some(BlockInfo { number, committed: true, verified: true }),
            },
            OpStatus::Rejected => TxReceipt {
                executed: true,
                success: Some(false),
                fail_reason: op.fail_reason.clone(),
                block: None,
            },
        })
    }

    fn open_wallet(&self, signer: Arc<dyn EthSigner>) -> Result<Arc<dyn RollupWallet>, ProviderError> {
        Ok(Arc::new(MockWallet {
            ledger: self.clone(),
            address: signer.address(),
        }))
    }
}

/// Wallet of one account on a [`MockLedger`]
#[derive(Debug, Clone)]
pub struct MockWallet {
    ledger: MockLedger,
    address: Address,
}

impl MockWallet {
    fn record(&self, kind: OperationKind, to: Address, token: TokenSymbol, amount: Wei, fee: Wei) -> SubmissionRecord {
        SubmissionRecord {
            handle: TxHandle::Tx(String::new()),
            kind,
            from: self.address,
            to,
            token,
            amount,
            fee,
            nonce: None,
        }
    }
}

#[async_trait]
impl RollupWallet for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_signing_key_set(&self) -> Result<bool, ProviderError> {
        let state = self.ledger.state();
        Ok(state
            .accounts
            .get(&self.address)
            .map(|account| account.key_committed)
            .unwrap_or(false))
    }

    async fn account_id(&self) -> Result<Option<u32>, ProviderError> {
        Ok(self.ledger.state().accounts.get(&self.address).map(|account| account.id))
    }

    async fn account_state(&self) -> Result<RawAccountState, ProviderError> {
        Ok(self.ledger.state().raw_state(&self.address))
    }

    async fn set_signing_key(&self, request: ChangePubKeyRequest) -> Result<TxHandle, ProviderError> {
        let record = self.record(OperationKind::Authorize, self.address, request.fee_token, 0, request.fee);
        self.ledger.submit(record).await
    }

    async fn deposit(&self, request: DepositRequest) -> Result<TxHandle, ProviderError> {
        let record = self.record(OperationKind::Deposit, request.deposit_to, request.token, request.amount, 0);
        self.ledger.submit(record).await
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TxHandle, ProviderError> {
        let record = self.record(OperationKind::Transfer, request.to, request.token, request.amount, request.fee);
        self.ledger.submit(record).await
    }

    async fn withdraw(&self, request: WithdrawRequest) -> Result<TxHandle, ProviderError> {
        let record = self.record(
            OperationKind::Withdraw,
            request.eth_address,
            request.token,
            request.amount,
            request.fee,
        );
        self.ledger.submit(record).await
    }
}
