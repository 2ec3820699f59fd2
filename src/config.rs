//! Environment-driven configuration.
//!
//! Values come from the process environment, after loading an optional
//! `.env` file.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::OrchestratorError;

// ============================================================================
// DEFAULTS
// ============================================================================

pub const DEFAULT_NETWORK: &str = "goerli";
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:1234";

/// Literal endpoint value selecting the in-memory ledger
pub const MOCK_ENDPOINT: &str = "mock";

/// Where a client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The network's well-known public endpoint
    Default,
    /// In-memory mock ledger
    Mock,
    Url(String),
}

impl Endpoint {
    /// Unset selects the network default; empty or `mock` selects mock mode
    pub fn from_setting(value: Option<String>) -> Self {
        match value {
            None => Endpoint::Default,
            Some(value) => {
                let value = value.trim();
                if value.is_empty() || value.eq_ignore_ascii_case(MOCK_ENDPOINT) {
                    Endpoint::Mock
                } else {
                    Endpoint::Url(value.to_string())
                }
            }
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Endpoint::Mock)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_chain_network: String,
    pub rollup_network: String,
    pub base_chain_endpoint: Endpoint,
    pub rollup_endpoint: Endpoint,
    pub rpc_timeout: Duration,
    pub poll_interval: Duration,
    pub confirmation_timeout: Option<Duration>,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self, OrchestratorError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_chain_network = lookup("BASE_CHAIN_NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string());
        let rollup_network = lookup("ROLLUP_NETWORK").unwrap_or_else(|| base_chain_network.clone());

        let rpc_timeout = Duration::from_secs(
            parse_number(&lookup, "RPC_TIMEOUT_SECS")?.unwrap_or(DEFAULT_RPC_TIMEOUT_SECS),
        );
        let poll_interval = Duration::from_millis(
            parse_number(&lookup, "POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );
        if poll_interval.is_zero() {
            return Err(OrchestratorError::Config("POLL_INTERVAL_MS must be positive".into()));
        }
        let confirmation_timeout = parse_number(&lookup, "CONFIRMATION_TIMEOUT_SECS")?.map(Duration::from_secs);

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| OrchestratorError::Config(format!("BIND_ADDR: {}", e)))?;

        Ok(Config {
            base_chain_network,
            rollup_network,
            base_chain_endpoint: Endpoint::from_setting(lookup("BASE_CHAIN_RPC_URL")),
            rollup_endpoint: Endpoint::from_setting(lookup("ROLLUP_RPC_URL")),
            rpc_timeout,
            poll_interval,
            confirmation_timeout,
            bind_addr,
        })
    }

    /// Both ledgers simulated in memory
    pub fn mock(network: &str) -> Self {
        Config {
            base_chain_network: network.to_string(),
            rollup_network: network.to_string(),
            base_chain_endpoint: Endpoint::Mock,
            rollup_endpoint: Endpoint::Mock,
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            confirmation_timeout: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1234)),
        }
    }
}

fn parse_number<F>(lookup: &F, key: &str) -> Result<Option<u64>, OrchestratorError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| OrchestratorError::Config(format!("{} must be a non-negative integer, got {:?}", key, raw))),
    }
}
