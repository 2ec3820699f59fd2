// Application state for the HTTP host

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::account::Account;
use crate::clients::RollupProvider;
use crate::connect::Clients;
use crate::error::OrchestratorError;
use crate::mock_ledger::MockLedger;
use crate::models::{Address, Network, TokenSymbol};
use crate::orchestrator::{ConfirmationPolicy, Orchestrator};
use crate::signer::test_accounts;
use crate::units::Wei;

pub type SharedState = Arc<AppState>;

/// Base-chain funds given to each test account in mock mode
pub const MOCK_BASE_FUNDING: Wei = 100_000_000_000_000_000_000;

/// Rollup funds given to each test account in mock mode
pub const MOCK_ROLLUP_FUNDING: Wei = 10_000_000_000_000_000_000;

pub struct AppState {
    pub orchestrator: Orchestrator,
    /// In-memory ledger when running in mock mode
    pub mock: Option<MockLedger>,
    /// Test accounts by upper-case name
    pub accounts: BTreeMap<String, Arc<Account>>,
}

impl AppState {
    pub fn new(clients: Clients, policy: ConfirmationPolicy) -> Result<Self, OrchestratorError> {
        let orchestrator = Orchestrator::new(clients.base, clients.rollup, policy);

        let mut accounts = BTreeMap::new();
        for test_account in test_accounts() {
            let account = orchestrator.derive_account(Arc::new(test_account.signer.clone()))?;
            info!(name = %test_account.name, address = %account.address(), "test account ready");
            accounts.insert(test_account.name.clone(), Arc::new(account));
        }

        Ok(AppState {
            orchestrator,
            mock: clients.mock,
            accounts,
        })
    }

    pub fn network(&self) -> Network {
        self.orchestrator.rollup().network()
    }

    pub fn is_mock(&self) -> bool {
        self.mock.is_some()
    }

    /// Look an account up by name (case-insensitive) or address
    pub fn account(&self, name_or_address: &str) -> Option<Arc<Account>> {
        if let Some(account) = self.accounts.get(&name_or_address.to_uppercase()) {
            return Some(account.clone());
        }
        let address: Address = name_or_address.parse().ok()?;
        self.accounts
            .values()
            .find(|account| account.address() == address)
            .cloned()
    }

    /// Address of a known account, or a literal address
    pub fn resolve_address(&self, name_or_address: &str) -> Option<Address> {
        match self.account(name_or_address) {
            Some(account) => Some(account.address()),
            None => name_or_address.parse().ok(),
        }
    }

    /// Fund every test account and register its key on the mock ledger
    pub fn seed_mock_accounts(&self) {
        let ledger = match &self.mock {
            Some(ledger) => ledger,
            None => return,
        };
        for (name, account) in &self.accounts {
            let address = account.address();
            ledger.fund_base(&address, MOCK_BASE_FUNDING);
            ledger.fund_rollup(&address, &TokenSymbol::eth(), MOCK_ROLLUP_FUNDING);
            ledger.register_key(&address);
            info!(%name, %address, "seeded mock account");
        }
    }
}
