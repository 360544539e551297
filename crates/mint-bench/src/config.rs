//! Benchmark configuration.
//!
//! Values start from [`BenchConfig::default`], can be overridden by a TOML
//! file, and finally by command line flags or the environment.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy::primitives::{
    U256,
    utils::{UnitsError, parse_ether},
};
use serde::Deserialize;

use crate::preflight::FundingPolicy;

/// RPC endpoint used when none is configured.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
/// Native currency handed to each benchmark account.
pub const DEFAULT_UNIT_FUNDING_COST: &str = "0.002";
/// Operator headroom for deployments and the batch call.
pub const DEFAULT_FIXED_RESERVE: &str = "0.1";
pub const DEFAULT_HIGH_LOAD_THRESHOLD: u64 = 80;
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_EVENT_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_ARTIFACTS_DIR: &str = "contracts/out";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed reading config file `{}`", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed parsing config file `{}`", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("`{field}` is not a valid ether amount: `{value}`")]
    Ether {
        field: &'static str,
        value: String,
        source: UnitsError,
    },
}

/// Resolved configuration of a run.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub rpc_url: String,
    pub artifacts_dir: PathBuf,
    pub funding: FundingPolicy,
    /// Amount minted by each benchmark account.
    pub mint_amount: U256,
    /// Upper bound on every suspended network call.
    pub tx_timeout: Duration,
    /// How long the event counter may trail the receipt join.
    pub event_grace: Duration,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            funding: FundingPolicy {
                unit_funding_cost: U256::from(2_000_000_000_000_000u64),
                fixed_reserve: U256::from(100_000_000_000_000_000u64),
                high_load_threshold: DEFAULT_HIGH_LOAD_THRESHOLD,
            },
            mint_amount: U256::from(1),
            tx_timeout: DEFAULT_TX_TIMEOUT,
            event_grace: DEFAULT_EVENT_GRACE,
        }
    }
}

impl BenchConfig {
    /// Loads defaults overridden by the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::default();
        file.apply(&mut config)?;
        Ok(config)
    }

    /// Sets the per-account funding from a decimal ether string.
    pub fn set_unit_funding_cost(&mut self, ether: &str) -> Result<(), ConfigError> {
        self.funding.unit_funding_cost = parse_ether_field("unit_funding_cost", ether)?;
        Ok(())
    }

    /// Sets the operator reserve from a decimal ether string.
    pub fn set_fixed_reserve(&mut self, ether: &str) -> Result<(), ConfigError> {
        self.funding.fixed_reserve = parse_ether_field("fixed_reserve", ether)?;
        Ok(())
    }
}

/// On-disk form of [`BenchConfig`]. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    rpc_url: Option<String>,
    artifacts_dir: Option<PathBuf>,
    unit_funding_cost: Option<String>,
    fixed_reserve: Option<String>,
    high_load_threshold: Option<u64>,
    mint_amount: Option<u64>,
    tx_timeout_secs: Option<u64>,
    event_grace_secs: Option<u64>,
}

impl ConfigFile {
    fn apply(self, config: &mut BenchConfig) -> Result<(), ConfigError> {
        if let Some(rpc_url) = self.rpc_url {
            config.rpc_url = rpc_url;
        }
        if let Some(dir) = self.artifacts_dir {
            config.artifacts_dir = dir;
        }
        if let Some(cost) = self.unit_funding_cost {
            config.set_unit_funding_cost(&cost)?;
        }
        if let Some(reserve) = self.fixed_reserve {
            config.set_fixed_reserve(&reserve)?;
        }
        if let Some(threshold) = self.high_load_threshold {
            config.funding.high_load_threshold = threshold;
        }
        if let Some(amount) = self.mint_amount {
            config.mint_amount = U256::from(amount);
        }
        if let Some(secs) = self.tx_timeout_secs {
            config.tx_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.event_grace_secs {
            config.event_grace = Duration::from_secs(secs);
        }
        Ok(())
    }
}

fn parse_ether_field(field: &'static str, value: &str) -> Result<U256, ConfigError> {
    parse_ether(value).map_err(|source| ConfigError::Ether {
        field,
        value: value.to_string(),
        source,
    })
}
