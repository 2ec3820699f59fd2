// ============================================================================
// Base-chain RPC client
// ============================================================================
//
// Ethereum JSON-RPC endpoints used:
//   eth_chainId              - connection probe, network check
//   eth_getBalance(addr)     - base-chain ETH balance
//
// ============================================================================

use async_trait::async_trait;
use std::time::Duration;

use super::json_rpc::{parse_hex_quantity, JsonRpcClient};
use crate::clients::BaseChainClient;
use crate::error::ProviderError;
use crate::models::{Address, Network};
use crate::units::Wei;

#[derive(Debug, Clone)]
pub struct EthRpcClient {
    network: Network,
    rpc: JsonRpcClient,
}

impl EthRpcClient {
    pub fn new(network: Network, endpoint: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(EthRpcClient {
            network,
            rpc: JsonRpcClient::new(endpoint, timeout)?,
        })
    }
}

#[async_trait]
impl BaseChainClient for EthRpcClient {
    fn network(&self) -> Network {
        self.network
    }

    fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let raw: String = self.rpc.call("eth_chainId", Vec::<String>::new()).await?;
        let id = parse_hex_quantity(&raw)?;
        u64::try_from(id).map_err(|_| ProviderError::InvalidResponse(format!("chain id out of range: {}", raw)))
    }

    async fn balance(&self, address: &Address) -> Result<Wei, ProviderError> {
        let raw: String = self
            .rpc
            .call("eth_getBalance", (address.to_string(), "latest"))
            .await?;
        parse_hex_quantity(&raw)
    }
}
