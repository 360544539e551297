//! Results of a benchmark run.

use std::time::Duration;

use alloy::primitives::U256;
use serde::Serialize;

use crate::{
    deployer::DeployedContracts,
    orchestrator::RunPhase,
    preflight::Preflight,
    tracker::{EventTally, MintFailure, Settled},
};

/// Timing of the concurrent mint phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmissionMetrics {
    pub operations: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Wall-clock time from the first dispatch to the last resolution.
    pub elapsed: Duration,
    /// Confirmed mints per second of `elapsed`.
    pub operations_per_second: f64,
    /// Median time a single mint took from dispatch to its receipt.
    pub p50_latency: Duration,
    pub p99_latency: Duration,
    pub total_gas_used: u64,
    /// Blocks between the first and last confirmed mint, inclusive.
    pub blocks_spanned: u64,
}

impl SubmissionMetrics {
    pub fn new(operations: u64, elapsed: Duration, settled: &Settled) -> Self {
        let mut mint_latencies = settled.latencies.clone();
        mint_latencies.sort_unstable();

        let operations_per_second = match elapsed.as_secs_f64() {
            secs if secs > 0.0 => settled.succeeded as f64 / secs,
            _ => 0.0,
        };

        Self {
            operations,
            succeeded: settled.succeeded,
            failed: settled.failed(),
            elapsed,
            operations_per_second,
            p50_latency: latency_at(&mint_latencies, 50),
            p99_latency: latency_at(&mint_latencies, 99),
            total_gas_used: settled.gas_used,
            blocks_spanned: settled.blocks_spanned(),
        }
    }
}

/// Nearest-rank percentile over mint latencies sorted ascending. Zero when no
/// mint resolved.
fn latency_at(sorted: &[Duration], percentile: usize) -> Duration {
    let Some(last) = sorted.len().checked_sub(1) else {
        return Duration::ZERO;
    };
    let rank = (sorted.len() * percentile).div_ceil(100);
    sorted[rank.saturating_sub(1).min(last)]
}

/// Everything a run reports.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub operations: u64,
    pub contracts: DeployedContracts,
    /// Balance check and high-load advisory, both taken before deployment.
    pub preflight: Preflight,
    /// Gas spent funding the distributor and crediting the accounts.
    pub provisioning_gas_used: u64,
    pub supply_before: U256,
    pub supply_after: U256,
    pub metrics: SubmissionMetrics,
    pub failures: Vec<MintFailure>,
    pub events: EventTally,
    pub phase: RunPhase,
}

impl BenchmarkReport {
    /// Increase of the token's total supply across the mint phase.
    pub fn supply_delta(&self) -> U256 {
        self.supply_after.saturating_sub(self.supply_before)
    }

    /// Whether the supply grew by exactly `mint_amount` per successful mint.
    pub fn supply_matches(&self, mint_amount: U256) -> bool {
        self.supply_delta() == mint_amount.saturating_mul(U256::from(self.metrics.succeeded))
    }
}
