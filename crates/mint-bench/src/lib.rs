//! Concurrent mint throughput benchmark for EVM chains.
//!
//! A run deploys a value distributor and a mintable token, funds N freshly
//! generated accounts through one batched `addFunds` call, then fires N
//! concurrent `mint` transactions (one per account) and measures the time
//! until every receipt has resolved. An independent `Transfer` event counter
//! and the token's total supply are used to cross-check the result.

pub mod client;
pub mod config;
pub mod contracts;
pub mod deployer;
pub mod error;
pub mod orchestrator;
pub mod preflight;
pub mod provisioner;
pub mod registry;
pub mod report;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use client::{ChainClient, Confirmation, RpcChainClient, TxSigner};
pub use config::BenchConfig;
pub use error::{BenchError, ChainError};
pub use orchestrator::{BenchmarkRun, Orchestrator, RunPhase};
pub use registry::{ContractKind, ContractRegistry};
pub use report::BenchmarkReport;
