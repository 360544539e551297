//! Balance check that runs before anything touches the chain.

use alloy::primitives::{U256, utils::format_ether};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::BenchError;

/// Funding policy for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingPolicy {
    /// Native currency handed to each benchmark account for gas.
    pub unit_funding_cost: U256,
    /// Headroom the operator needs on top, covering deployments and the batch call.
    pub fixed_reserve: U256,
    /// Operation counts above this trigger the high-load advisory.
    pub high_load_threshold: u64,
}

impl FundingPolicy {
    /// Value sent to the distributor contract for `operations` accounts.
    pub fn distributor_funding(&self, operations: u64) -> U256 {
        self.unit_funding_cost
            .saturating_mul(U256::from(operations))
    }

    /// Minimum operator balance for a run of `operations` mints.
    pub fn required_balance(&self, operations: u64) -> U256 {
        self.distributor_funding(operations)
            .saturating_add(self.fixed_reserve)
    }

    /// Validates `available` against the requirement for `operations`.
    ///
    /// Fails with [`BenchError::InsufficientBalance`] when the balance is
    /// strictly below the requirement. A count above the high-load threshold
    /// only produces an advisory.
    pub fn check(&self, operations: u64, available: U256) -> Result<Preflight, BenchError> {
        let required = self.required_balance(operations);
        if available < required {
            return Err(BenchError::InsufficientBalance {
                required,
                available,
            });
        }

        let high_load = operations > self.high_load_threshold;
        if high_load {
            warn!(
                operations,
                threshold = self.high_load_threshold,
                "Operation count is high, some mints or the funding batch may fail"
            );
        }

        info!(
            required = %format_ether(required),
            available = %format_ether(available),
            "Pre-flight balance check passed"
        );

        Ok(Preflight {
            required,
            available,
            high_load,
        })
    }
}

/// Outcome of a passed pre-flight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preflight {
    pub required: U256,
    pub available: U256,
    /// Whether the high-load advisory was emitted.
    pub high_load: bool,
}
