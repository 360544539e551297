use std::{fs::File, io::BufWriter, path::PathBuf, time::Duration};

use alloy::{primitives::utils::format_ether, signers::local::PrivateKeySigner};
use clap::Parser;
use eyre::{Context, Result};
use tempo_mint_bench::{
    BenchConfig, BenchmarkReport, ContractRegistry, Orchestrator, RpcChainClient,
};

#[derive(Parser, Debug)]
#[command(name = "otter-mint-bench")]
#[command(
    version,
    about = "Deploy a token, fund N fresh accounts and time N concurrent mints",
    long_about = None
)]
pub(crate) struct MintBenchArgs {
    /// Number of mint operations, one per generated account
    operations: u64,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RPC endpoint URL (http, https, ws or wss)
    #[arg(long, env = "L2_NODE_WEB3_URL")]
    rpc_url: Option<String>,

    /// Private key of the funded operator account
    #[arg(long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    private_key: PrivateKeySigner,

    /// Directory holding the compiled contract artifacts
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Native currency sent per account, in ether
    #[arg(long)]
    unit_funding_cost: Option<String>,

    /// Operator headroom on top of the account funding, in ether
    #[arg(long)]
    fixed_reserve: Option<String>,

    /// Operation count above which a high-load warning is printed
    #[arg(long)]
    high_load_threshold: Option<u64>,

    /// Timeout for every network call, in seconds
    #[arg(long)]
    tx_timeout: Option<u64>,

    /// How long to wait for trailing Transfer events, in seconds
    #[arg(long)]
    event_grace: Option<u64>,

    /// Output file for results (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl MintBenchArgs {
    pub(crate) async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        let registry = ContractRegistry::load(&config.artifacts_dir)
            .wrap_err("failed to load contract artifacts")?;

        let client = RpcChainClient::connect(&config.rpc_url, self.private_key.clone())
            .await
            .wrap_err_with(|| format!("failed to connect to {}", config.rpc_url))?;

        println!("-> Performing operations: {}", self.operations);
        let mut orchestrator = Orchestrator::new(&client, &registry, &config, self.operations);
        let report = orchestrator.execute().await?;

        self.output_results(&report)
    }

    /// Defaults, then the config file, then flags and environment.
    fn resolve_config(&self) -> Result<BenchConfig> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::default(),
        };

        if let Some(rpc_url) = &self.rpc_url {
            config.rpc_url.clone_from(rpc_url);
        }
        if let Some(dir) = &self.artifacts_dir {
            config.artifacts_dir.clone_from(dir);
        }
        if let Some(cost) = &self.unit_funding_cost {
            config.set_unit_funding_cost(cost)?;
        }
        if let Some(reserve) = &self.fixed_reserve {
            config.set_fixed_reserve(reserve)?;
        }
        if let Some(threshold) = self.high_load_threshold {
            config.funding.high_load_threshold = threshold;
        }
        if let Some(secs) = self.tx_timeout {
            config.tx_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.event_grace {
            config.event_grace = Duration::from_secs(secs);
        }

        Ok(config)
    }

    fn output_results(&self, report: &BenchmarkReport) -> Result<()> {
        let elapsed = report.metrics.elapsed;
        println!(
            "-> Operator balance: {} ETH (required {} ETH)",
            format_ether(report.preflight.available),
            format_ether(report.preflight.required)
        );
        if report.preflight.high_load {
            println!("-> High operation count, some mints may fail");
        }
        println!(
            "-> Deployed ValueDistributor: {} and Token: {}",
            report.contracts.distributor, report.contracts.token
        );
        println!("-> Initial supply is: {}", report.supply_before);
        println!(
            "-> Execution time: {}s {:.3}ms",
            elapsed.as_secs(),
            f64::from(elapsed.subsec_nanos()) / 1_000_000.0
        );
        println!("-> Current supply is: {}", report.supply_after);

        println!("\n=== Benchmark Results ===");
        println!("Operations: {}", report.operations);
        println!("Succeeded: {}", report.metrics.succeeded);
        println!("Failed: {}", report.metrics.failed);
        println!("Supply delta: {}", report.supply_delta());
        println!(
            "Transfer events: {}/{}",
            report.events.observed, report.events.expected
        );
        println!(
            "Operations per second: {:.2}",
            report.metrics.operations_per_second
        );
        println!("Total gas used: {}", report.metrics.total_gas_used);
        println!("Provisioning gas used: {}", report.provisioning_gas_used);
        println!("Blocks spanned: {}", report.metrics.blocks_spanned);
        println!("P50 latency: {:?}", report.metrics.p50_latency);
        println!("P99 latency: {:?}", report.metrics.p99_latency);
        for failure in &report.failures {
            println!("  {} failed: {}", failure.account, failure.error);
        }

        if let Some(output_path) = &self.output {
            let file = File::create(output_path)
                .wrap_err_with(|| format!("failed to create {}", output_path.display()))?;
            let writer = BufWriter::new(file);
            serde_json::to_writer_pretty(writer, report)?;
            println!("\nResults written to: {}", output_path.display());
        }

        Ok(())
    }
}
