//! Error types for a benchmark run.

use std::{fmt, time::Duration};

use alloy::primitives::{B256, U256};

use crate::registry::{ContractKind, RegistryError};

/// Failure of a single interaction with the chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("rpc request failed: {0}")]
    Rpc(String),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
    #[error("deployment {tx_hash} confirmed without a contract address")]
    MissingContractAddress { tx_hash: B256 },
    #[error("{operation} did not complete within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("event subscription failed: {0}")]
    Subscription(String),
    #[error("failed to decode {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: alloy::sol_types::Error,
    },
}

impl ChainError {
    pub(crate) fn rpc(err: impl fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub(crate) fn subscription(err: impl fmt::Display) -> Self {
        Self::Subscription(err.to_string())
    }
}

/// Step of account provisioning that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStage {
    /// Native-currency transfer from the operator to the distributor.
    FundDistributor,
    /// Batched `addFunds` call crediting every account.
    AddFunds,
}

impl fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FundDistributor => f.write_str("funding the distributor"),
            Self::AddFunds => f.write_str("crediting benchmark accounts"),
        }
    }
}

/// Fatal errors that abort a run.
///
/// Individual mint failures are not represented here; they are collected in
/// [`MintOutcome`](crate::tracker::MintOutcome)s and reported in aggregate.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("insufficient native balance: required {required} wei, available {available} wei")]
    InsufficientBalance { required: U256, available: U256 },
    #[error("failed to deploy {contract}")]
    Deployment {
        contract: ContractKind,
        source: ChainError,
    },
    #[error("account provisioning failed while {stage}")]
    Provisioning {
        stage: ProvisioningStage,
        source: ChainError,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
