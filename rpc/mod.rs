// ============================================================================
// RPC Module - live base-chain and rollup clients
// ============================================================================
//
// Components:
//   - json_rpc: JSON-RPC 2.0 transport over reqwest
//   - eth_rpc: Ethereum base-chain client (BaseChainClient)
//   - zksync_rpc: zkSync rollup client and read-only wallet (RollupProvider)
//
// ============================================================================

pub mod eth_rpc;
pub mod json_rpc;
pub mod zksync_rpc;

pub use eth_rpc::EthRpcClient;
pub use json_rpc::JsonRpcClient;
pub use zksync_rpc::{RemoteWallet, ZkSyncRpcClient};
