//! Connection establishment for both ledgers.
//!
//! A connection either succeeds with a probed, usable client or fails with
//! `OrchestratorError::Connection`; failures are logged here and returned.
//! There are no retries at this layer.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::clients::{BaseChainClient, RollupProvider};
use crate::config::{Config, Endpoint};
use crate::error::OrchestratorError;
use crate::mock_ledger::MockLedger;
use crate::models::Network;
use crate::rpc::{EthRpcClient, ZkSyncRpcClient};

/// Clients for one deployment
#[derive(Clone)]
pub struct Clients {
    pub base: Arc<dyn BaseChainClient>,
    pub rollup: Arc<dyn RollupProvider>,
    /// Set when both sides run against one shared in-memory ledger
    pub mock: Option<MockLedger>,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("base", &self.base.endpoint())
            .field("rollup", &self.rollup.endpoint())
            .field("mock", &self.mock.is_some())
            .finish()
    }
}

fn resolve_network(name: &str) -> Result<Network, OrchestratorError> {
    Network::from_name(name).ok_or_else(|| {
        error!(network = name, "unknown network");
        OrchestratorError::Connection {
            network: name.to_string(),
            reason: "unknown network".to_string(),
        }
    })
}

fn connection_error(network: Network, reason: String) -> OrchestratorError {
    error!(%network, %reason, "connection failed");
    OrchestratorError::Connection {
        network: network.to_string(),
        reason,
    }
}

/// Connect to the base chain of `network_name`
pub async fn connect_base_chain(
    network_name: &str,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<Arc<dyn BaseChainClient>, OrchestratorError> {
    let network = resolve_network(network_name)?;
    let url = match endpoint {
        Endpoint::Mock => {
            info!(%network, "base chain: mock mode");
            return Ok(Arc::new(MockLedger::new(network)));
        }
        Endpoint::Default => network.default_base_chain_endpoint().to_string(),
        Endpoint::Url(url) => url.clone(),
    };

    let client = EthRpcClient::new(network, &url, timeout).map_err(|e| connection_error(network, e.to_string()))?;
    let chain_id = client
        .chain_id()
        .await
        .map_err(|e| connection_error(network, format!("{} unreachable: {}", url, e)))?;
    if chain_id != network.chain_id() {
        return Err(connection_error(
            network,
            format!("{} reports chain id {}, expected {}", url, chain_id, network.chain_id()),
        ));
    }

    info!(%network, endpoint = %url, chain_id, "base chain connected");
    Ok(Arc::new(client))
}

/// Connect to the rollup of `network_name`
pub async fn connect_rollup(
    network_name: &str,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<Arc<dyn RollupProvider>, OrchestratorError> {
    let network = resolve_network(network_name)?;
    let url = match endpoint {
        Endpoint::Mock => {
            info!(%network, "rollup: mock mode");
            return Ok(Arc::new(MockLedger::new(network)));
        }
        Endpoint::Default => network.default_rollup_endpoint().to_string(),
        Endpoint::Url(url) => url.clone(),
    };

    let client = ZkSyncRpcClient::new(network, &url, timeout).map_err(|e| connection_error(network, e.to_string()))?;
    let contracts = client
        .contract_address()
        .await
        .map_err(|e| connection_error(network, format!("{} unreachable: {}", url, e)))?;

    info!(%network, endpoint = %url, main_contract = %contracts.main_contract, "rollup connected");
    Ok(Arc::new(client))
}

/// Connect both sides per `config`. When both are mocked they share one
/// in-memory ledger, so deposits leave the same base chain the rollup
/// credits; both sides must then name the same network.
pub async fn connect(config: &Config) -> Result<Clients, OrchestratorError> {
    if config.base_chain_endpoint.is_mock() && config.rollup_endpoint.is_mock() {
        let network = resolve_network(&config.rollup_network)?;
        let base_network = resolve_network(&config.base_chain_network)?;
        if base_network != network {
            return Err(connection_error(
                network,
                format!("in-memory ledger cannot serve base chain {} and rollup {}", base_network, network),
            ));
        }
        info!(%network, "running against the in-memory ledger");
        let ledger = MockLedger::new(network);
        return Ok(Clients {
            base: Arc::new(ledger.clone()),
            rollup: Arc::new(ledger.clone()),
            mock: Some(ledger),
        });
    }

    let base = connect_base_chain(&config.base_chain_network, &config.base_chain_endpoint, config.rpc_timeout).await?;
    let rollup = connect_rollup(&config.rollup_network, &config.rollup_endpoint, config.rpc_timeout).await?;
    Ok(Clients { base, rollup, mock: None })
}
