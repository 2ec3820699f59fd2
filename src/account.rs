//! Rollup account handle.
//!
//! An [`Account`] binds a base-chain signer to its rollup wallet, tracks the
//! signing-key registration state and serializes submissions so the ledger
//! sees one account's operations in program order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::clients::{RollupProvider, RollupWallet};
use crate::error::{OrchestratorError, ProviderError};
use crate::models::{Address, Network, OperationReceipt};
use crate::signer::EthSigner;

/// Registration state of the account's rollup signing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Unregistered,
    PendingAuthorization,
    Registered,
}

#[derive(Debug)]
struct AccountMeta {
    account_id: Option<u32>,
    key_status: KeyStatus,
    /// Submitted authorization still awaiting inclusion
    pending_authorization: Option<OperationReceipt>,
}

/// One rollup account and its wallet
pub struct Account {
    address: Address,
    network: Network,
    wallet: Arc<dyn RollupWallet>,
    meta: Mutex<AccountMeta>,
    /// FIFO queue of submitters; held from the precondition checks until the
    /// ledger acknowledges the submission
    submissions: AsyncMutex<()>,
}

impl Account {
    pub fn new(wallet: Arc<dyn RollupWallet>, network: Network) -> Self {
        Account {
            address: wallet.address(),
            network,
            wallet,
            meta: Mutex::new(AccountMeta {
                account_id: None,
                key_status: KeyStatus::Unregistered,
                pending_authorization: None,
            }),
            submissions: AsyncMutex::new(()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn wallet(&self) -> &Arc<dyn RollupWallet> {
        &self.wallet
    }

    /// Ledger-assigned id, as last observed
    pub fn account_id(&self) -> Option<u32> {
        self.meta().account_id
    }

    pub fn key_status(&self) -> KeyStatus {
        self.meta().key_status
    }

    pub fn is_registered(&self) -> bool {
        self.key_status() == KeyStatus::Registered
    }

    /// Re-read the account id and key registration from the ledger
    pub async fn refresh(&self) -> Result<(), ProviderError> {
        let account_id = self.wallet.account_id().await?;
        let key_set = self.wallet.is_signing_key_set().await?;

        let mut meta = self.meta();
        if account_id.is_some() {
            meta.account_id = account_id;
        }
        if key_set {
            meta.key_status = KeyStatus::Registered;
            meta.pending_authorization = None;
        }
        debug!(address = %self.address, ?account_id, key_set, "refreshed account");
        Ok(())
    }

    /// Wait for this account's turn to submit
    pub(crate) async fn submission_slot(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.submissions.lock().await
    }

    /// The in-flight authorization, if one was submitted and has neither
    /// landed nor failed yet
    pub(crate) fn pending_authorization(&self) -> Option<OperationReceipt> {
        self.meta().pending_authorization.clone()
    }

    /// Unregistered -> PendingAuthorization once the ledger accepted
    /// `receipt`. Returns false when the key is already registered.
    pub(crate) fn begin_authorization(&self, receipt: OperationReceipt) -> bool {
        let mut meta = self.meta();
        match meta.key_status {
            KeyStatus::Registered => false,
            _ => {
                meta.key_status = KeyStatus::PendingAuthorization;
                meta.pending_authorization = Some(receipt);
                true
            }
        }
    }

    pub(crate) fn finish_authorization(&self) {
        let mut meta = self.meta();
        meta.key_status = KeyStatus::Registered;
        meta.pending_authorization = None;
    }

    /// Back to Unregistered after a failed authorization; never undoes
    /// a registration.
    pub(crate) fn abort_authorization(&self) {
        let mut meta = self.meta();
        if meta.key_status == KeyStatus::PendingAuthorization {
            meta.key_status = KeyStatus::Unregistered;
            meta.pending_authorization = None;
        }
    }

    fn meta(&self) -> MutexGuard<'_, AccountMeta> {
        self.meta.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.meta();
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("network", &self.network)
            .field("account_id", &meta.account_id)
            .field("key_status", &meta.key_status)
            .finish()
    }
}

/// Bind a base-chain signer to its rollup account. Deterministic: the same
/// signer on the same rollup network always yields the same address. No
/// ledger state is changed.
pub fn derive_account(
    signer: Arc<dyn EthSigner>,
    rollup: &dyn RollupProvider,
) -> Result<Account, OrchestratorError> {
    let wallet = rollup.open_wallet(signer)?;
    Ok(Account::new(wallet, rollup.network()))
}
