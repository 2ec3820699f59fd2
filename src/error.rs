//! Error types for ledger collaborators and the orchestrator.

use std::time::Duration;
use thiserror::Error;

use crate::models::{Address, FeeKind, OperationKind, Stage, TokenSymbol, TxHandle};
use crate::units::UnitsError;

/// Failure reported by a base-chain or rollup client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The endpoint could not be reached
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The endpoint answered with something we cannot decode
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The ledger refused the request
    #[error("rejected by ledger: {0}")]
    Rejected(String),
    /// The ledger does not support the request (token, fee kind, ...)
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// This client cannot sign rollup transactions
    #[error("rollup signing is not available for {0}")]
    SigningUnavailable(Address),
}

/// Typed failures surfaced to orchestrator callers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("cannot connect to {network}: {reason}")]
    Connection { network: String, reason: String },

    #[error("account {0} is unknown to the rollup (it has never received funds)")]
    UnknownAccount(Address),

    #[error("signing key of {0} is not registered")]
    SigningKeyNotSet(Address),

    #[error("{kind} submission failed: {source}")]
    Submission {
        kind: OperationKind,
        #[source]
        source: ProviderError,
    },

    #[error("{tx} failed to confirm at stage {stage}: {reason}")]
    Confirmation {
        tx: TxHandle,
        stage: Stage,
        reason: String,
    },

    #[error("fee estimation for {kind} of {token} rejected: {source}")]
    Estimation {
        kind: FeeKind,
        token: TokenSymbol,
        #[source]
        source: ProviderError,
    },

    #[error("{tx} not confirmed after {waited:?}; last stage {stage}")]
    Timeout {
        tx: TxHandle,
        stage: Stage,
        waited: Duration,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("query failed: {0}")]
    Query(#[from] ProviderError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<UnitsError> for OrchestratorError {
    fn from(err: UnitsError) -> Self {
        OrchestratorError::InvalidAmount(err.to_string())
    }
}

impl OrchestratorError {
    /// Last lifecycle stage observed before the failure, when one exists
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OrchestratorError::Confirmation { stage, .. } | OrchestratorError::Timeout { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }

    /// Short stable code used by the HTTP host
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Connection { .. } => "connection_error",
            OrchestratorError::UnknownAccount(_) => "unknown_account",
            OrchestratorError::SigningKeyNotSet(_) => "signing_key_not_set",
            OrchestratorError::Submission { .. } => "submission_error",
            OrchestratorError::Confirmation { .. } => "confirmation_error",
            OrchestratorError::Estimation { .. } => "estimation_error",
            OrchestratorError::Timeout { .. } => "timeout",
            OrchestratorError::InvalidAmount(_) => "invalid_amount",
            OrchestratorError::Query(_) => "query_error",
            OrchestratorError::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_is_carried_by_wait_failures() {
        let err = OrchestratorError::Timeout {
            tx: TxHandle::Tx("sync-tx:aa".into()),
            stage: Stage::PendingVerification,
            waited: Duration::from_secs(5),
        };
        assert_eq!(err.stage(), Some(Stage::PendingVerification));
        assert_eq!(err.code(), "timeout");

        let err = OrchestratorError::InvalidAmount("zero".into());
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_units_error_becomes_invalid_amount() {
        let err: OrchestratorError = UnitsError::Parse("x".into()).into();
        assert!(matches!(err, OrchestratorError::InvalidAmount(_)));
    }

    #[test]
    fn test_display_includes_context() {
        let err = OrchestratorError::Connection {
            network: "atlantis".into(),
            reason: "unknown network name".into(),
        };
        assert_eq!(err.to_string(), "cannot connect to atlantis: unknown network name");
    }
}
