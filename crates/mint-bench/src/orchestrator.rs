//! Top-level control flow of a benchmark run.

use std::fmt;

use alloy::{
    primitives::{Address, U256},
    rpc::types::TransactionRequest,
    sol_types::{SolCall, SolType, sol_data},
};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::{
    client::{ChainClient, Confirmation, TxSigner, with_timeout},
    config::BenchConfig,
    contracts::IMintableToken,
    deployer::{DeployedContracts, deploy_contracts},
    error::{BenchError, ChainError},
    preflight::Preflight,
    provisioner::{AccountProvisioner, EphemeralAccount},
    registry::ContractRegistry,
    report::{BenchmarkReport, SubmissionMetrics},
    tracker::{EventCounter, MintOutcome, Settled},
};

/// Lifecycle of a run. Transitions are strictly sequential; `Failed` is
/// reachable from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    Validating,
    Deploying,
    Provisioning,
    Funding,
    Submitting,
    AwaitingCompletion,
    Reporting,
    Done,
    Failed,
}

impl RunPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State of a single run. Every result field is written once.
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    operations: u64,
    phase: RunPhase,
    failed_in: Option<RunPhase>,
    preflight: Option<Preflight>,
    contracts: Option<DeployedContracts>,
    elapsed: Option<Duration>,
    supply_before: Option<U256>,
    supply_after: Option<U256>,
}

impl BenchmarkRun {
    pub fn new(operations: u64) -> Self {
        Self {
            operations,
            phase: RunPhase::Idle,
            failed_in: None,
            preflight: None,
            contracts: None,
            elapsed: None,
            supply_before: None,
            supply_after: None,
        }
    }

    pub fn operations(&self) -> u64 {
        self.operations
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Phase that was active when the run failed.
    pub fn failed_in(&self) -> Option<RunPhase> {
        self.failed_in
    }

    /// Result of the balance check, recorded before any deployment.
    pub fn preflight(&self) -> Option<Preflight> {
        self.preflight
    }

    pub fn contracts(&self) -> Option<DeployedContracts> {
        self.contracts
    }

    /// Duration of the concurrent mint phase.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn supply_before(&self) -> Option<U256> {
        self.supply_before
    }

    pub fn supply_after(&self) -> Option<U256> {
        self.supply_after
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(!self.phase.is_terminal(), "run already finished");
        info!(from = %self.phase, to = %next, "Benchmark phase");
        self.phase = next;
    }

    fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.failed_in = Some(self.phase);
            self.phase = RunPhase::Failed;
        }
    }
}

/// Sequences pre-flight, deployment, provisioning, the concurrent mint phase
/// and reporting.
pub struct Orchestrator<'a, C: ?Sized> {
    client: &'a C,
    registry: &'a ContractRegistry,
    config: &'a BenchConfig,
    run: BenchmarkRun,
}

impl<'a, C> Orchestrator<'a, C>
where
    C: ChainClient + ?Sized,
{
    pub fn new(
        client: &'a C,
        registry: &'a ContractRegistry,
        config: &'a BenchConfig,
        operations: u64,
    ) -> Self {
        Self {
            client,
            registry,
            config,
            run: BenchmarkRun::new(operations),
        }
    }

    pub fn run(&self) -> &BenchmarkRun {
        &self.run
    }

    /// Runs the benchmark to completion.
    ///
    /// Fatal errors move the run to [`RunPhase::Failed`]; individual mint
    /// failures do not and are part of the report instead.
    pub async fn execute(&mut self) -> Result<BenchmarkReport, BenchError> {
        match self.drive().await {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(phase = %self.run.phase, error = %err, "Benchmark failed");
                self.run.fail();
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<BenchmarkReport, BenchError> {
        let operations = self.run.operations;
        let timeout = self.config.tx_timeout;
        info!(operations, "Performing operations");

        self.run.advance(RunPhase::Validating);
        let operator = self.client.operator();
        let balance = with_timeout("balance query", timeout, self.client.balance(operator)).await?;
        let preflight = self.config.funding.check(operations, balance)?;
        self.run.preflight = Some(preflight);

        self.run.advance(RunPhase::Deploying);
        let contracts = deploy_contracts(self.client, self.registry, timeout).await?;
        self.run.contracts = Some(contracts);

        self.run.advance(RunPhase::Provisioning);
        let provisioner = AccountProvisioner::new(
            self.client,
            contracts.distributor,
            &self.config.funding,
            timeout,
        );
        let accounts = provisioner.generate(operations);

        self.run.advance(RunPhase::Funding);
        let funded = provisioner.fund(&accounts).await?;
        debug_assert_eq!(funded.batch_size as u64, operations);

        // Subscribe before the first mint so no Transfer can be missed.
        let events = EventCounter::start(self.client, contracts.token, operations, timeout).await?;

        let supply_before = self.total_supply(contracts.token).await?;
        self.run.supply_before = Some(supply_before);
        info!(%supply_before, "Initial supply");

        self.run.advance(RunPhase::Submitting);
        let (outcomes, elapsed) = self.submit_mints(&accounts, contracts.token).await;
        self.run.elapsed = Some(elapsed);

        let settled = Settled::from_outcomes(&outcomes);
        info!(
            ?elapsed,
            succeeded = settled.succeeded,
            failed = settled.failed(),
            "All mints resolved"
        );
        for failure in &settled.failures {
            warn!(account = %failure.account, error = %failure.error, "Mint failed");
        }

        self.run.advance(RunPhase::Reporting);
        let tally = events.finish(settled.succeeded, self.config.event_grace).await;
        let supply_after = self.total_supply(contracts.token).await?;
        self.run.supply_after = Some(supply_after);
        info!(%supply_after, "Current supply");

        let report = BenchmarkReport {
            operations,
            contracts,
            preflight,
            provisioning_gas_used: funded.gas_used(),
            supply_before,
            supply_after,
            metrics: SubmissionMetrics::new(operations, elapsed, &settled),
            failures: settled.failures,
            events: tally,
            phase: RunPhase::Done,
        };

        if !report.supply_matches(self.config.mint_amount) {
            warn!(
                delta = %report.supply_delta(),
                succeeded = report.metrics.succeeded,
                "Supply delta does not match confirmed mints"
            );
        }
        if !tally.complete() {
            warn!(
                observed = tally.observed,
                expected = tally.expected,
                "Fewer Transfer events than operations"
            );
        }

        self.run.advance(RunPhase::Done);
        Ok(report)
    }

    /// Fires one mint per account without waiting in between, then joins on
    /// all of them. Returns every outcome and the wall-clock time of the phase.
    async fn submit_mints(
        &mut self,
        accounts: &[EphemeralAccount],
        token: Address,
    ) -> (Vec<MintOutcome>, Duration) {
        if accounts.is_empty() {
            self.run.advance(RunPhase::AwaitingCompletion);
            return (Vec::new(), Duration::ZERO);
        }

        let client = self.client;
        let beneficiary = client.operator();
        let amount = self.config.mint_amount;
        let timeout = self.config.tx_timeout;

        let started = Instant::now();
        let mints = join_all(
            accounts
                .iter()
                .map(|account| mint(client, account, token, beneficiary, amount, timeout)),
        );
        self.run.advance(RunPhase::AwaitingCompletion);
        let outcomes = mints.await;

        (outcomes, started.elapsed())
    }

    async fn total_supply(&self, token: Address) -> Result<U256, ChainError> {
        let request = TransactionRequest::default()
            .to(token)
            .input(IMintableToken::totalSupplyCall {}.abi_encode().into());
        let result = with_timeout("totalSupply", self.config.tx_timeout, self.client.call(request))
            .await?;

        <sol_data::Uint<256> as SolType>::abi_decode(&result).map_err(|source| {
            ChainError::Decode {
                what: "totalSupply",
                source,
            }
        })
    }
}

async fn mint<C>(
    client: &C,
    account: &EphemeralAccount,
    token: Address,
    beneficiary: Address,
    amount: U256,
    timeout: Duration,
) -> MintOutcome
where
    C: ChainClient + ?Sized,
{
    let started = Instant::now();
    let request = TransactionRequest::default().to(token).input(
        IMintableToken::mintCall {
            to: beneficiary,
            amount,
        }
        .abi_encode()
        .into(),
    );

    let result = with_timeout(
        "mint",
        timeout,
        client.transact(TxSigner::Account(account.signer()), request),
    )
    .await
    .and_then(Confirmation::ensure_success);

    MintOutcome {
        account: account.address(),
        latency: started.elapsed(),
        result,
    }
}
