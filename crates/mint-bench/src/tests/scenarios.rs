//! Full runs against [`MockChain`].

use std::time::Duration;

use alloy::primitives::U256;

use super::fixtures::*;
use crate::{
    error::{BenchError, ChainError, ProvisioningStage},
    orchestrator::{Orchestrator, RunPhase},
    registry::ContractKind,
};

async fn wait_for_unsubscribe(chain: &MockChain) {
    for _ in 0..100 {
        if chain.unsubscribes() > 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
}

async fn assert_full_run(operations: u64, balance: &str) {
    let chain = MockChain::new(ether(balance));
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, operations);
    let report = orchestrator.execute().await.unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(orchestrator.run().phase(), RunPhase::Done);
    assert_eq!(report.contracts.distributor, DISTRIBUTOR);
    assert_eq!(report.contracts.token, TOKEN);
    assert_eq!(report.supply_delta(), U256::from(operations));
    assert!(report.supply_matches(config.mint_amount));
    assert_eq!(report.metrics.succeeded, operations);
    assert!(report.failures.is_empty());
    assert_eq!(report.events.observed, operations);
    assert!(report.events.complete());
    assert_eq!(report.preflight.high_load, operations > 80);
    assert_eq!(report.preflight.available, ether(balance));
    assert_eq!(
        report.provisioning_gas_used,
        21_000 * (operations + 2),
        "distributor transfer plus one batch over every account"
    );
    if operations > 0 {
        assert_eq!(report.metrics.blocks_spanned, operations);
    }

    let sent = chain.sent();
    assert_eq!(sent[0], Sent::Deploy(DISTRIBUTOR));
    assert_eq!(sent[1], Sent::Deploy(TOKEN));
    assert_eq!(
        sent[2],
        Sent::FundDistributor(ether("0.002") * U256::from(operations))
    );
    assert_eq!(sent[3], Sent::AddFunds(operations as usize));
    assert_eq!(sent.len(), 4 + operations as usize);

    assert_eq!(chain.subscriptions(), 1);
    assert_eq!(chain.unsubscribes(), 1);
}

#[tokio::test]
async fn single_mint() {
    assert_full_run(1, "1").await;
}

#[tokio::test]
async fn no_mints() {
    assert_full_run(0, "1").await;
}

#[tokio::test]
async fn fifty_mints_at_exact_balance() {
    assert_full_run(50, "0.2").await;
}

#[tokio::test]
async fn hundred_mints_with_advisory() {
    assert_full_run(100, "1").await;
}

#[tokio::test]
async fn no_mints_reports_zero_elapsed() {
    let chain = MockChain::new(ether("1"));
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 0);
    let report = orchestrator.execute().await.unwrap();

    assert_eq!(report.metrics.elapsed, Duration::ZERO);
    assert_eq!(orchestrator.run().elapsed(), Some(Duration::ZERO));
    assert_eq!(report.supply_before, report.supply_after);
}

#[tokio::test]
async fn reverted_mint_is_reported_not_fatal() {
    let chain = MockChain::new(ether("1")).reverting_mints([2]);
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 5);
    let report = orchestrator.execute().await.unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(report.supply_delta(), U256::from(4));
    assert!(report.supply_matches(config.mint_amount));
    assert_eq!(report.metrics.succeeded, 4);
    assert_eq!(report.metrics.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].tx_hash.is_some());
    assert_eq!(report.events.observed, 4);
    assert!(!report.events.complete());
    assert_eq!(chain.unsubscribes(), 1);
}

#[tokio::test(start_paused = true)]
async fn elapsed_covers_only_the_mint_phase() {
    let chain = MockChain::new(ether("1"))
        .with_deploy_delay(Duration::from_secs(5))
        .with_mint_delay(Duration::from_millis(100));
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 10);
    let report = orchestrator.execute().await.unwrap();

    // Mints run concurrently, so ten of them take one mint delay.
    assert!(report.metrics.elapsed >= Duration::from_millis(100));
    assert!(report.metrics.elapsed < Duration::from_secs(1));
    assert!(report.metrics.p99_latency < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn elapsed_excludes_provisioning() {
    let chain = MockChain::new(ether("1"))
        .with_provision_delay(Duration::from_secs(5))
        .with_mint_delay(Duration::from_millis(100));
    let registry = registry();
    let config = config();

    let started = tokio::time::Instant::now();
    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 10);
    let report = orchestrator.execute().await.unwrap();

    // Both funding transactions waited, so the run itself took over ten seconds.
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(report.metrics.elapsed >= Duration::from_millis(100));
    assert!(report.metrics.elapsed < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn slow_mint_times_out_individually() {
    let chain = MockChain::new(ether("1")).with_mint_delay(Duration::from_secs(600));
    let registry = registry();
    let mut config = config();
    config.tx_timeout = Duration::from_secs(30);

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 3);
    let report = orchestrator.execute().await.unwrap();

    assert_eq!(report.metrics.failed, 3);
    assert_eq!(report.supply_delta(), U256::ZERO);
    assert!(report.failures.iter().all(|failure| failure.tx_hash.is_none()));
    assert_eq!(chain.unsubscribes(), 1);
}

#[tokio::test]
async fn insufficient_balance_sends_nothing() {
    let chain = MockChain::new(ether("0.2") - U256::from(1));
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 50);
    let err = orchestrator.execute().await.unwrap_err();

    match err {
        BenchError::InsufficientBalance {
            required,
            available,
        } => {
            assert_eq!(required, ether("0.2"));
            assert_eq!(available, ether("0.2") - U256::from(1));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.run().phase(), RunPhase::Failed);
    assert_eq!(orchestrator.run().failed_in(), Some(RunPhase::Validating));
    assert!(chain.sent().is_empty());
    assert_eq!(chain.subscriptions(), 0);
}

async fn assert_deployment_failure(index: usize, expected: ContractKind) {
    let chain = MockChain::new(ether("1")).reverting_deployment(index);
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 3);
    let err = orchestrator.execute().await.unwrap_err();

    assert!(matches!(
        err,
        BenchError::Deployment {
            contract,
            source: ChainError::Reverted { .. },
        } if contract == expected
    ));
    assert_eq!(orchestrator.run().failed_in(), Some(RunPhase::Deploying));
    assert!(
        !chain
            .sent()
            .iter()
            .any(|sent| matches!(sent, Sent::FundDistributor(_)))
    );
}

#[tokio::test]
async fn distributor_deployment_failure() {
    assert_deployment_failure(0, ContractKind::ValueDistributor).await;
}

#[tokio::test]
async fn token_deployment_failure() {
    assert_deployment_failure(1, ContractKind::Token).await;
}

#[tokio::test]
async fn advisory_is_recorded_before_deployment() {
    let chain = MockChain::new(ether("1")).reverting_deployment(0);
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 100);
    let err = orchestrator.execute().await.unwrap_err();

    assert!(matches!(err, BenchError::Deployment { .. }));
    assert_eq!(orchestrator.run().failed_in(), Some(RunPhase::Deploying));
    let preflight = orchestrator.run().preflight().unwrap();
    assert!(preflight.high_load);
    assert_eq!(preflight.required, ether("0.3"));
    assert!(orchestrator.run().contracts().is_none());
}

#[tokio::test]
async fn failed_preflight_records_nothing() {
    let chain = MockChain::new(ether("0.1"));
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 100);
    orchestrator.execute().await.unwrap_err();

    assert!(orchestrator.run().preflight().is_none());
}

#[tokio::test]
async fn reverted_batch_aborts_before_minting() {
    let chain = MockChain::new(ether("1")).reverting_add_funds();
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 4);
    let err = orchestrator.execute().await.unwrap_err();

    assert!(matches!(
        err,
        BenchError::Provisioning {
            stage: ProvisioningStage::AddFunds,
            ..
        }
    ));
    assert_eq!(orchestrator.run().failed_in(), Some(RunPhase::Funding));
    assert!(!chain.sent().iter().any(|sent| matches!(sent, Sent::Mint(_))));
    assert_eq!(chain.total_supply(), U256::ZERO);
}

#[tokio::test(start_paused = true)]
async fn lost_events_still_release_subscription() {
    let chain = MockChain::new(ether("1")).dropping_events();
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 6);
    let report = orchestrator.execute().await.unwrap();

    // Receipts define completion; the supply still matches.
    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(report.supply_delta(), U256::from(6));
    assert_eq!(report.events.observed, 0);
    assert!(!report.events.complete());
    assert_eq!(chain.subscriptions(), 1);
    assert_eq!(chain.unsubscribes(), 1);
}

#[tokio::test]
async fn early_failure_releases_subscription() {
    let chain = MockChain::new(ether("1")).failing_supply_query();
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 2);
    let err = orchestrator.execute().await.unwrap_err();

    assert!(matches!(err, BenchError::Chain(ChainError::Rpc(_))));
    assert_eq!(chain.subscriptions(), 1);
    wait_for_unsubscribe(&chain).await;
    assert_eq!(chain.unsubscribes(), 1);
}

#[tokio::test]
async fn supply_query_is_stable_without_mints() {
    let chain = MockChain::new(ether("1"));
    let registry = registry();
    let config = config();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 0);
    let first = orchestrator.execute().await.unwrap();

    let mut orchestrator = Orchestrator::new(&chain, &registry, &config, 0);
    let second = orchestrator.execute().await.unwrap();

    assert_eq!(first.supply_after, second.supply_before);
    assert_eq!(second.supply_delta(), U256::ZERO);
}
