// ============================================================================
// Rollup RPC client
// ============================================================================
//
// zkSync JSON-RPC endpoints used:
//   contract_address                 - connection probe
//   get_tx_fee(kind, addr, token)    - fee quote
//   account_info(addr)               - id, committed/verified balances, key hash
//   tx_info(hash)                    - receipt of a rollup transaction
//   ethop_info(serial_id)            - receipt of a priority (deposit) operation
//
// The live client is read-only: it carries no rollup signer, so wallets it
// opens answer queries but refuse every submission.
//
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::json_rpc::{parse_decimal_string, JsonRpcClient};
use crate::clients::{
    BlockInfo, ChangePubKeyRequest, DepositRequest, FeeQuote, RawAccountState, RawBalances, RollupProvider,
    RollupWallet, TransferRequest, TxReceipt, WithdrawRequest,
};
use crate::error::ProviderError;
use crate::models::{Address, FeeKind, Network, TokenSymbol, TxHandle};
use crate::signer::EthSigner;

/// Public key hash of an account that never registered a signing key
pub const EMPTY_PUB_KEY_HASH: &str = "sync:0000000000000000000000000000000000000000";

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddress {
    pub main_contract: String,
    pub gov_contract: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfoResponse {
    id: Option<u32>,
    committed: AccountLevelResponse,
    verified: AccountLevelResponse,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountLevelResponse {
    #[serde(default)]
    balances: BTreeMap<String, String>,
    nonce: u32,
    pub_key_hash: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockResponse {
    block_number: u64,
    committed: bool,
    verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxInfoResponse {
    executed: bool,
    success: Option<bool>,
    fail_reason: Option<String>,
    block: Option<BlockResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EthOpInfoResponse {
    executed: bool,
    block: Option<BlockResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeResponse {
    gas_fee: String,
    zkp_fee: String,
    total_fee: String,
}

impl AccountLevelResponse {
    fn into_raw(self) -> Result<RawBalances, ProviderError> {
        let mut balances = BTreeMap::new();
        for (token, amount) in self.balances {
            balances.insert(TokenSymbol::new(&token), parse_decimal_string(&amount)?);
        }
        Ok(RawBalances {
            balances,
            nonce: self.nonce,
        })
    }
}

impl AccountInfoResponse {
    fn is_signing_key_set(&self) -> bool {
        self.committed.pub_key_hash != EMPTY_PUB_KEY_HASH
    }

    fn into_raw(self) -> Result<RawAccountState, ProviderError> {
        Ok(RawAccountState {
            account_id: self.id,
            committed: self.committed.into_raw()?,
            verified: self.verified.into_raw()?,
        })
    }
}

impl From<BlockResponse> for BlockInfo {
    fn from(block: BlockResponse) -> Self {
        BlockInfo {
            number: block.block_number,
            committed: block.committed,
            verified: block.verified,
        }
    }
}

impl From<TxInfoResponse> for TxReceipt {
    fn from(info: TxInfoResponse) -> Self {
        TxReceipt {
            executed: info.executed,
            success: info.success,
            fail_reason: info.fail_reason,
            block: info.block.map(BlockInfo::from),
        }
    }
}

impl From<EthOpInfoResponse> for TxReceipt {
    fn from(info: EthOpInfoResponse) -> Self {
        TxReceipt {
            executed: info.executed,
            success: if info.executed { Some(true) } else { None },
            fail_reason: None,
            block: info.block.map(BlockInfo::from),
        }
    }
}

impl FeeResponse {
    fn into_quote(self) -> Result<FeeQuote, ProviderError> {
        Ok(FeeQuote {
            gas_fee: parse_decimal_string(&self.gas_fee)?,
            zkp_fee: parse_decimal_string(&self.zkp_fee)?,
            total_fee: parse_decimal_string(&self.total_fee)?,
        })
    }
}

/// `txType` argument of `get_tx_fee`
fn fee_type_param(kind: FeeKind) -> Value {
    match kind {
        FeeKind::Transfer => json!("Transfer"),
        FeeKind::Withdraw => json!("Withdraw"),
        FeeKind::FastWithdraw => json!("FastWithdraw"),
        FeeKind::ChangePubKey => json!({ "ChangePubKey": { "onchainPubkeyAuth": false } }),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct ZkSyncRpcClient {
    network: Network,
    rpc: JsonRpcClient,
}

impl ZkSyncRpcClient {
    pub fn new(network: Network, endpoint: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(ZkSyncRpcClient {
            network,
            rpc: JsonRpcClient::new(endpoint, timeout)?,
        })
    }

    /// Rollup contract addresses on the base chain
    pub async fn contract_address(&self) -> Result<ContractAddress, ProviderError> {
        self.rpc.call("contract_address", Vec::<String>::new()).await
    }

    async fn account_info(&self, address: &Address) -> Result<AccountInfoResponse, ProviderError> {
        self.rpc.call("account_info", [address.to_string()]).await
    }
}

#[async_trait]
impl RollupProvider for ZkSyncRpcClient {
    fn network(&self) -> Network {
        self.network
    }

    fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    async fn transaction_fee(
        &self,
        kind: FeeKind,
        address: &Address,
        token: &TokenSymbol,
    ) -> Result<FeeQuote, ProviderError> {
        let params = json!([fee_type_param(kind), address.to_string(), token.as_str()]);
        let response: FeeResponse = self.rpc.call("get_tx_fee", params).await?;
        response.into_quote()
    }

    async fn account_state(&self, address: &Address) -> Result<RawAccountState, ProviderError> {
        self.account_info(address).await?.into_raw()
    }

    async fn receipt(&self, handle: &TxHandle) -> Result<TxReceipt, ProviderError> {
        match handle {
            TxHandle::Tx(hash) => {
                let info: TxInfoResponse = self.rpc.call("tx_info", [hash.as_str()]).await?;
                Ok(info.into())
            }
            TxHandle::PriorityOp(serial_id) => {
                let info: EthOpInfoResponse = self.rpc.call("ethop_info", [*serial_id]).await?;
                Ok(info.into())
            }
        }
    }

    fn open_wallet(&self, signer: Arc<dyn EthSigner>) -> Result<Arc<dyn RollupWallet>, ProviderError> {
        Ok(Arc::new(RemoteWallet {
            client: self.clone(),
            address: signer.address(),
        }))
    }
}

// ============================================================================
// READ-ONLY WALLET
// ============================================================================

/// Wallet view over the live rollup. Queries go to the endpoint; submissions
/// fail with `SigningUnavailable`.
#[derive(Debug, Clone)]
pub struct RemoteWallet {
    client: ZkSyncRpcClient,
    address: Address,
}

impl RemoteWallet {
    fn refuse(&self, operation: &str) -> ProviderError {
        warn!(address = %self.address, operation, "live rollup wallet cannot sign");
        ProviderError::SigningUnavailable(self.address)
    }
}

#[async_trait]
impl RollupWallet for RemoteWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn is_signing_key_set(&self) -> Result<bool, ProviderError> {
        Ok(self.client.account_info(&self.address).await?.is_signing_key_set())
    }

    async fn account_id(&self) -> Result<Option<u32>, ProviderError> {
        Ok(self.client.account_info(&self.address).await?.id)
    }

    async fn account_state(&self) -> Result<RawAccountState, ProviderError> {
        self.client.account_state(&self.address).await
    }

    async fn set_signing_key(&self, _request: ChangePubKeyRequest) -> Result<TxHandle, ProviderError> {
        Err(self.refuse("set_signing_key"))
    }

    async fn deposit(&self, _request: DepositRequest) -> Result<TxHandle, ProviderError> {
        Err(self.refuse("deposit"))
    }

    async fn transfer(&self, _request: TransferRequest) -> Result<TxHandle, ProviderError> {
        Err(self.refuse("transfer"))
    }

    async fn withdraw(&self, _request: WithdrawRequest) -> Result<TxHandle, ProviderError> {
        Err(self.refuse("withdraw"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_info_parsing() {
        let value = json!({
            "address": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
            "id": 42,
            "depositing": {"balances": {}},
            "committed": {
                "balances": {"ETH": "1500000000000000000", "USDC": "2500000"},
                "nonce": 3,
                "pubKeyHash": "sync:1f2e3d4c5b6a79880716253443526170f1e2d3c4"
            },
            "verified": {
                "balances": {"ETH": "1000000000000000000"},
                "nonce": 2,
                "pubKeyHash": EMPTY_PUB_KEY_HASH
            }
        });
        let info: AccountInfoResponse = serde_json::from_value(value).unwrap();
        assert!(info.is_signing_key_set());

        let raw = info.into_raw().unwrap();
        assert_eq!(raw.account_id, Some(42));
        assert_eq!(raw.committed.nonce, 3);
        assert_eq!(
            raw.committed.balances.get(&TokenSymbol::eth()),
            Some(&1_500_000_000_000_000_000)
        );
        assert_eq!(raw.committed.balances.get(&TokenSymbol::new("usdc")), Some(&2_500_000));
        assert_eq!(raw.verified.balances.len(), 1);
    }

    #[test]
    fn test_fresh_account_has_no_key() {
        let value = json!({
            "address": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
            "id": null,
            "committed": {"balances": {}, "nonce": 0, "pubKeyHash": EMPTY_PUB_KEY_HASH},
            "verified": {"balances": {}, "nonce": 0, "pubKeyHash": EMPTY_PUB_KEY_HASH}
        });
        let info: AccountInfoResponse = serde_json::from_value(value).unwrap();
        assert!(!info.is_signing_key_set());
        assert_eq!(info.into_raw().unwrap().account_id, None);
    }

    #[test]
    fn test_tx_info_parsing() {
        let pending: TxInfoResponse = serde_json::from_value(json!({
            "executed": false,
            "success": null,
            "failReason": null,
            "block": null
        }))
        .unwrap();
        assert_eq!(TxReceipt::from(pending), TxReceipt::pending());

        let failed: TxInfoResponse = serde_json::from_value(json!({
            "executed": true,
            "success": false,
            "failReason": "Nonce mismatch",
            "block": {"blockNumber": 77, "committed": true, "verified": false}
        }))
        .unwrap();
        let receipt = TxReceipt::from(failed);
        assert_eq!(receipt.success, Some(false));
        assert_eq!(receipt.fail_reason.as_deref(), Some("Nonce mismatch"));
        assert_eq!(receipt.block.map(|b| b.number), Some(77));
    }

    #[test]
    fn test_ethop_info_parsing() {
        let info: EthOpInfoResponse = serde_json::from_value(json!({
            "executed": true,
            "block": {"blockNumber": 12, "committed": true, "verified": true}
        }))
        .unwrap();
        let receipt = TxReceipt::from(info);
        assert_eq!(receipt.success, Some(true));
        assert!(receipt.block.map(|b| b.verified).unwrap_or(false));
    }

    #[test]
    fn test_fee_parsing() {
        let fee: FeeResponse = serde_json::from_value(json!({
            "feeType": "TransferToNew",
            "gasTxAmount": "2000",
            "gasPriceWei": "1000000000",
            "gasFee": "80000000000000",
            "zkpFee": "20000000000000",
            "totalFee": "100000000000000"
        }))
        .unwrap();
        let quote = fee.into_quote().unwrap();
        assert_eq!(quote.total_fee, 100_000_000_000_000);
        assert_eq!(quote.gas_fee + quote.zkp_fee, quote.total_fee);
    }

    #[test]
    fn test_fee_type_param() {
        assert_eq!(fee_type_param(FeeKind::Transfer), json!("Transfer"));
        assert_eq!(
            fee_type_param(FeeKind::ChangePubKey),
            json!({"ChangePubKey": {"onchainPubkeyAuth": false}})
        );
    }

    #[tokio::test]
    async fn test_remote_wallet_refuses_submissions() {
        let client =
            ZkSyncRpcClient::new(Network::Localhost, "http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let signer = Arc::new(crate::signer::LocalSigner::random());
        let address = signer.address();
        let wallet = client.open_wallet(signer).unwrap();

        let result = wallet
            .deposit(DepositRequest {
                deposit_to: address,
                token: TokenSymbol::eth(),
                amount: 1,
            })
            .await;
        assert_eq!(result, Err(ProviderError::SigningUnavailable(address)));
    }
}
