//! Deployment of the benchmark contracts.

use std::time::Duration;

use alloy::primitives::Address;
use serde::Serialize;
use tracing::info;

use crate::{
    client::{ChainClient, with_timeout},
    error::BenchError,
    registry::{ContractKind, ContractRegistry},
};

/// Addresses of the deployed contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeployedContracts {
    pub distributor: Address,
    pub token: Address,
}

/// Deploys the distributor and then the token from the operator account.
///
/// Each deployment is confirmed before the next one is signed so the operator
/// nonce advances deterministically. Any failure is fatal.
pub async fn deploy_contracts<C>(
    client: &C,
    registry: &ContractRegistry,
    timeout: Duration,
) -> Result<DeployedContracts, BenchError>
where
    C: ChainClient + ?Sized,
{
    let distributor = deploy_one(client, registry, ContractKind::ValueDistributor, timeout).await?;
    let token = deploy_one(client, registry, ContractKind::Token, timeout).await?;

    info!(%distributor, %token, "Deployed benchmark contracts");

    Ok(DeployedContracts { distributor, token })
}

async fn deploy_one<C>(
    client: &C,
    registry: &ContractRegistry,
    contract: ContractKind,
    timeout: Duration,
) -> Result<Address, BenchError>
where
    C: ChainClient + ?Sized,
{
    info!(%contract, "Deploying contract");

    let bytecode = registry.artifact(contract).bytecode.clone();
    let address = with_timeout("contract deployment", timeout, client.deploy(bytecode))
        .await
        .map_err(|source| BenchError::Deployment { contract, source })?;

    info!(%contract, %address, "Contract deployment confirmed");
    Ok(address)
}
