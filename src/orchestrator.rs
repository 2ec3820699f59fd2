//! Transaction lifecycle orchestrator.
//!
//! Drives deposits, transfers, withdrawals and key registration through
//! submitted -> committed -> verified, polling the rollup for receipts on a
//! fixed interval until the operation's target stage is reached, the ledger
//! rejects it, or the caller's deadline passes.
//!
//! The orchestrator keeps no mutable state of its own. Submissions for one
//! account are serialized through the account's submission queue; every
//! confirmation wait, key registration included, happens outside the queue
//! so a slow proof never blocks the next submission.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::account::{self, Account};
use crate::clients::{
    BaseChainClient, ChangePubKeyRequest, DepositRequest, RawBalances, RollupProvider, TransferRequest,
    TxReceipt, WithdrawRequest,
};
use crate::error::OrchestratorError;
use crate::models::{
    AccountState, Address, BalanceSnapshot, FeeKind, Operation, OperationKind, OperationReceipt, Stage,
    TokenSymbol,
};
use crate::signer::EthSigner;
use crate::units::{self, Wei};

/// Default interval between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Deadline `timeout` from now; `None` when it lies beyond what the clock
/// can represent, which is the same as waiting indefinitely
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// How long to wait for confirmations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    /// Applied when the caller gives no deadline; `None` waits indefinitely
    pub default_timeout: Option<Duration>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        ConfirmationPolicy {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: None,
        }
    }
}

/// Result of [`Orchestrator::execute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    Receipt(OperationReceipt),
    /// Authorization on an account whose key is already registered
    AlreadyRegistered,
    Fee { amount: Decimal },
    State(AccountState),
}

/// A fund movement after defaults have been resolved
#[derive(Debug, Clone)]
struct Movement {
    kind: OperationKind,
    to: Address,
    token: TokenSymbol,
    amount: Decimal,
    fee: Option<Decimal>,
}

#[derive(Clone)]
pub struct Orchestrator {
    base: Arc<dyn BaseChainClient>,
    rollup: Arc<dyn RollupProvider>,
    policy: ConfirmationPolicy,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base", &self.base.endpoint())
            .field("rollup", &self.rollup.endpoint())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        base: Arc<dyn BaseChainClient>,
        rollup: Arc<dyn RollupProvider>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Orchestrator { base, rollup, policy }
    }

    pub fn base(&self) -> &Arc<dyn BaseChainClient> {
        &self.base
    }

    pub fn rollup(&self) -> &Arc<dyn RollupProvider> {
        &self.rollup
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    pub fn derive_account(&self, signer: Arc<dyn EthSigner>) -> Result<Account, OrchestratorError> {
        account::derive_account(signer, self.rollup.as_ref())
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Run any operation for `account`
    pub async fn execute(
        &self,
        account: &Account,
        operation: Operation,
        deadline: Option<Instant>,
    ) -> Result<OperationOutcome, OrchestratorError> {
        match operation {
            Operation::Deposit { to, token, amount } => self
                .deposit(account, to, token, amount, deadline)
                .await
                .map(OperationOutcome::Receipt),
            Operation::Transfer { to, token, amount, fee } => self
                .transfer(account, to, token, amount, fee, deadline)
                .await
                .map(OperationOutcome::Receipt),
            Operation::Withdraw { to, token, amount, fee } => self
                .withdraw(account, to, token, amount, fee, deadline)
                .await
                .map(OperationOutcome::Receipt),
            Operation::Authorize => Ok(match self.authorize_signing_key(account, deadline).await? {
                Some(receipt) => OperationOutcome::Receipt(receipt),
                None => OperationOutcome::AlreadyRegistered,
            }),
            Operation::FeeQuery { kind, to, token } => self
                .estimate_fee(kind, &to, &token)
                .await
                .map(|amount| OperationOutcome::Fee { amount }),
            Operation::BalanceQuery { tokens } => self
                .account_state(account, &tokens)
                .await
                .map(OperationOutcome::State),
        }
    }

    // ========================================================================
    // KEY AUTHORIZATION
    // ========================================================================

    /// Register the account's rollup signing key.
    ///
    /// Returns `None` when the key is already registered (no submission).
    /// Fails with `UnknownAccount` before submitting anything when the
    /// ledger has not assigned the account an id yet. While an earlier
    /// authorization is still in flight, waits on that one instead of
    /// submitting again.
    pub async fn authorize_signing_key(
        &self,
        account: &Account,
        deadline: Option<Instant>,
    ) -> Result<Option<OperationReceipt>, OrchestratorError> {
        let address = account.address();
        info!(%address, "registering signing key");

        let submitted = {
            let _slot = account.submission_slot().await;

            if account.is_registered() {
                debug!(%address, "signing key already registered");
                return Ok(None);
            }
            account.refresh().await?;
            if account.is_registered() {
                info!(%address, "signing key was registered on the ledger");
                return Ok(None);
            }
            if account.account_id().is_none() {
                warn!(%address, "cannot register signing key: unknown account");
                return Err(OrchestratorError::UnknownAccount(address));
            }
            match account.pending_authorization() {
                Some(pending) => {
                    debug!(%address, tx = %pending.tx, "authorization already in flight");
                    pending
                }
                None => {
                    let receipt = self.submit_authorization(account).await?;
                    if !account.begin_authorization(receipt.clone()) {
                        return Ok(None);
                    }
                    receipt
                }
            }
        };

        let result = self.await_stage(submitted, deadline).await;
        match &result {
            Ok(receipt) => {
                account.finish_authorization();
                info!(%address, tx = %receipt.tx, "signing key registered");
            }
            // Still in flight; a later call resumes waiting on it
            Err(OrchestratorError::Timeout { tx, stage, .. }) => {
                warn!(%address, %tx, %stage, "signing key registration not confirmed before deadline");
            }
            Err(err) => {
                account.abort_authorization();
                warn!(%address, error = %err, "signing key registration failed");
            }
        }
        result.map(Some)
    }

    async fn submit_authorization(&self, account: &Account) -> Result<OperationReceipt, OrchestratorError> {
        let fee_token = TokenSymbol::eth();
        let quote = self
            .estimate_native_fee(FeeKind::ChangePubKey, &account.address(), &fee_token)
            .await?;
        let fee = self.rollup.closest_packable_fee(quote);

        let handle = account
            .wallet()
            .set_signing_key(ChangePubKeyRequest { fee_token, fee })
            .await
            .map_err(|source| OrchestratorError::Submission {
                kind: OperationKind::Authorize,
                source,
            })?;

        Ok(OperationReceipt::new(
            OperationKind::Authorize,
            handle,
            None,
            Some(self.base.format_amount(fee)?),
        ))
    }

    // ========================================================================
    // FUND MOVEMENT
    // ========================================================================

    /// Move `amount` of `token` from the base chain into the rollup.
    /// `to` defaults to the depositor's own rollup address.
    pub async fn deposit(
        &self,
        account: &Account,
        to: Option<Address>,
        token: TokenSymbol,
        amount: Decimal,
        deadline: Option<Instant>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let movement = Movement {
            kind: OperationKind::Deposit,
            to: to.unwrap_or_else(|| account.address()),
            token,
            amount,
            fee: None,
        };
        self.move_funds(account, movement, deadline).await
    }

    /// Transfer inside the rollup. The fee is estimated when not given.
    pub async fn transfer(
        &self,
        account: &Account,
        to: Address,
        token: TokenSymbol,
        amount: Decimal,
        fee: Option<Decimal>,
        deadline: Option<Instant>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let movement = Movement {
            kind: OperationKind::Transfer,
            to,
            token,
            amount,
            fee,
        };
        self.move_funds(account, movement, deadline).await
    }

    /// Withdraw from the rollup to the base chain and wait for the proof.
    /// `to` defaults to the withdrawer's own base-chain address.
    pub async fn withdraw(
        &self,
        account: &Account,
        to: Option<Address>,
        token: TokenSymbol,
        amount: Decimal,
        fee: Option<Decimal>,
        deadline: Option<Instant>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let movement = Movement {
            kind: OperationKind::Withdraw,
            to: to.unwrap_or_else(|| account.address()),
            token,
            amount,
            fee,
        };
        self.move_funds(account, movement, deadline).await
    }

    /// Shared protocol: quantize, submit in account order, await the
    /// kind's target stage.
    async fn move_funds(
        &self,
        account: &Account,
        movement: Movement,
        deadline: Option<Instant>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let Movement { kind, to, token, amount, fee } = movement;
        let from = account.address();

        let receipt = {
            let _slot = account.submission_slot().await;

            if kind != OperationKind::Deposit {
                self.ensure_registered(account).await?;
            }

            let packed_amount = self.quantize_amount(amount)?;
            if packed_amount == 0 {
                return Err(OrchestratorError::InvalidAmount(format!(
                    "{} {} rounds to zero",
                    amount, token
                )));
            }

            let packed_fee = if kind.packs_fee() {
                let fee_kind = match kind {
                    OperationKind::Withdraw => FeeKind::Withdraw,
                    _ => FeeKind::Transfer,
                };
                let native = match fee {
                    Some(fee) => units::to_wei(fee)?,
                    None => self.estimate_native_fee(fee_kind, &to, &token).await?,
                };
                Some(self.rollup.closest_packable_fee(native))
            } else {
                None
            };

            info!(
                %kind,
                %from,
                %to,
                %token,
                amount = packed_amount,
                fee = packed_fee,
                "submitting"
            );

            let wallet = account.wallet();
            let submitted = match kind {
                OperationKind::Deposit => {
                    wallet
                        .deposit(DepositRequest { deposit_to: to, token, amount: packed_amount })
                        .await
                }
                OperationKind::Transfer => {
                    wallet
                        .transfer(TransferRequest {
                            to,
                            token,
                            amount: packed_amount,
                            fee: packed_fee.unwrap_or_default(),
                        })
                        .await
                }
                _ => {
                    wallet
                        .withdraw(WithdrawRequest {
                            eth_address: to,
                            token,
                            amount: packed_amount,
                            fee: packed_fee.unwrap_or_default(),
                        })
                        .await
                }
            };
            let handle = submitted.map_err(|source| {
                warn!(%kind, %from, error = %source, "submission refused");
                OrchestratorError::Submission { kind, source }
            })?;

            let fee = match packed_fee {
                Some(fee) => Some(self.base.format_amount(fee)?),
                None => None,
            };
            OperationReceipt::new(kind, handle, Some(self.base.format_amount(packed_amount)?), fee)
        };

        self.await_stage(receipt, deadline).await
    }

    async fn ensure_registered(&self, account: &Account) -> Result<(), OrchestratorError> {
        if account.is_registered() {
            return Ok(());
        }
        account.refresh().await?;
        if account.is_registered() {
            Ok(())
        } else {
            Err(OrchestratorError::SigningKeyNotSet(account.address()))
        }
    }

    // ========================================================================
    // QUANTIZATION
    // ========================================================================

    /// Largest packable amount not above `amount`, in native units
    pub fn quantize_amount(&self, amount: Decimal) -> Result<Wei, OrchestratorError> {
        let native = units::to_wei(amount)?;
        Ok(self.rollup.closest_packable_amount(native))
    }

    /// Largest packable fee not above `fee`, in native units
    pub fn quantize_fee(&self, fee: Decimal) -> Result<Wei, OrchestratorError> {
        let native = units::to_wei(fee)?;
        Ok(self.rollup.closest_packable_fee(native))
    }

    // ========================================================================
    // CONFIRMATION
    // ========================================================================

    /// Wait until `receipt` reaches its kind's target stage.
    ///
    /// Can be called again with the receipt of an earlier timeout to keep
    /// waiting: the submitted operation is never rolled back.
    pub async fn await_stage(
        &self,
        mut receipt: OperationReceipt,
        deadline: Option<Instant>,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let target = match receipt.kind.target_stage() {
            Some(target) => target,
            None => return Ok(receipt),
        };
        let deadline = deadline.or_else(|| self.policy.default_timeout.and_then(deadline_after));
        let started = Instant::now();

        let wait = self.poll_until(&mut receipt, target);
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, wait).await,
            None => Ok(wait.await),
        };

        match result {
            Ok(Ok(())) => Ok(receipt),
            Ok(Err(err)) => Err(err),
            Err(_) => {
                let waited = started.elapsed();
                warn!(tx = %receipt.tx, stage = %receipt.stage, ?waited, "confirmation deadline passed");
                Err(OrchestratorError::Timeout {
                    tx: receipt.tx.clone(),
                    stage: receipt.stage,
                    waited,
                })
            }
        }
    }

    async fn poll_until(&self, receipt: &mut OperationReceipt, target: Stage) -> Result<(), OrchestratorError> {
        loop {
            let raw = self.rollup.receipt(&receipt.tx).await.map_err(|err| {
                OrchestratorError::Confirmation {
                    tx: receipt.tx.clone(),
                    stage: receipt.stage,
                    reason: err.to_string(),
                }
            })?;

            let observed = observed_stage(&raw, receipt.kind);
            if observed == Stage::Rejected {
                let last = receipt.stage;
                let reason = raw
                    .fail_reason
                    .clone()
                    .unwrap_or_else(|| "rejected by ledger".to_string());
                warn!(tx = %receipt.tx, stage = %last, %reason, "operation rejected");
                receipt.reject(reason.clone());
                return Err(OrchestratorError::Confirmation {
                    tx: receipt.tx.clone(),
                    stage: last,
                    reason,
                });
            }

            if stage_rank(observed) > stage_rank(receipt.stage) {
                receipt.advance(observed, raw.block.map(|block| block.number));
                info!(tx = %receipt.tx, kind = %receipt.kind, stage = %receipt.stage, "stage reached");
            }
            if receipt.stage.reaches(target) {
                return Ok(());
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Total fee the rollup charges for `kind` to `to` in `token`
    pub async fn estimate_fee(
        &self,
        kind: FeeKind,
        to: &Address,
        token: &TokenSymbol,
    ) -> Result<Decimal, OrchestratorError> {
        let native = self.estimate_native_fee(kind, to, token).await?;
        Ok(self.base.format_amount(native)?)
    }

    async fn estimate_native_fee(
        &self,
        kind: FeeKind,
        to: &Address,
        token: &TokenSymbol,
    ) -> Result<Wei, OrchestratorError> {
        let quote = self
            .rollup
            .transaction_fee(kind, to, token)
            .await
            .map_err(|source| {
                warn!(%kind, %token, error = %source, "fee estimation rejected");
                OrchestratorError::Estimation {
                    kind,
                    token: token.clone(),
                    source,
                }
            })?;
        debug!(%kind, %token, total = quote.total_fee, "fee quoted");
        Ok(quote.total_fee)
    }

    /// Committed and verified balances of `account`. Every token in
    /// `tokens` is present in both snapshots, zero when the ledger has no
    /// entry for it.
    pub async fn account_state(
        &self,
        account: &Account,
        tokens: &[TokenSymbol],
    ) -> Result<AccountState, OrchestratorError> {
        let raw = account.wallet().account_state().await?;

        let mut committed = self.snapshot(&raw.committed)?;
        let mut verified = self.snapshot(&raw.verified)?;
        committed.fill_zero(tokens);
        verified.fill_zero(tokens);

        let state = AccountState {
            address: account.address(),
            account_id: raw.account_id,
            committed,
            verified,
        };
        for token in tokens {
            for line in state.balance_report(token) {
                info!("{}", line);
            }
        }
        Ok(state)
    }

    /// Base-chain balance of `address`
    pub async fn base_balance(&self, address: &Address) -> Result<Decimal, OrchestratorError> {
        let native = self.base.balance(address).await?;
        Ok(self.base.format_amount(native)?)
    }

    fn snapshot(&self, raw: &RawBalances) -> Result<BalanceSnapshot, OrchestratorError> {
        let mut snapshot = BalanceSnapshot {
            nonce: raw.nonce,
            ..BalanceSnapshot::default()
        };
        for (token, native) in &raw.balances {
            snapshot
                .balances
                .insert(token.clone(), self.base.format_amount(*native)?);
        }
        Ok(snapshot)
    }
}

/// Stage implied by a rollup receipt for an operation of `kind`
fn observed_stage(raw: &TxReceipt, kind: OperationKind) -> Stage {
    if raw.success == Some(false) {
        return Stage::Rejected;
    }
    match raw.block {
        Some(block) if block.verified => Stage::Verified,
        Some(block) if block.committed => {
            if kind == OperationKind::Withdraw {
                Stage::PendingVerification
            } else {
                Stage::Committed
            }
        }
        _ => Stage::Submitted,
    }
}

fn stage_rank(stage: Stage) -> u8 {
    match stage {
        Stage::Submitted => 0,
        Stage::Committed | Stage::PendingVerification => 1,
        Stage::Verified => 2,
        Stage::Rejected => 3,
    }
}
