//! Generation and funding of the benchmark accounts.

use std::time::Duration;

use alloy::{
    primitives::{Address, U256, utils::format_ether},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use tracing::info;

use crate::{
    client::{ChainClient, Confirmation, TxSigner, with_timeout},
    contracts::IValueDistributor,
    error::{BenchError, ProvisioningStage},
    preflight::FundingPolicy,
};

/// Single-purpose account that signs exactly one mint.
#[derive(Debug, Clone)]
pub struct EphemeralAccount {
    signer: PrivateKeySigner,
}

impl EphemeralAccount {
    /// Fresh random key with no balance and no nonce history.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

/// Ordered beneficiaries of one `addFunds` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningBatch {
    beneficiaries: Vec<Address>,
}

impl ProvisioningBatch {
    /// One entry per account, in account order.
    pub fn for_accounts(accounts: &[EphemeralAccount]) -> Self {
        Self {
            beneficiaries: accounts.iter().map(EphemeralAccount::address).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.beneficiaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beneficiaries.is_empty()
    }

    pub fn beneficiaries(&self) -> &[Address] {
        &self.beneficiaries
    }

    pub fn to_call(&self) -> IValueDistributor::addFundsCall {
        IValueDistributor::addFundsCall {
            beneficiaries: self
                .beneficiaries
                .iter()
                .map(|&account| IValueDistributor::Beneficiary {
                    testAccount: account,
                })
                .collect(),
        }
    }
}

/// Confirmations of the two funding transactions.
#[derive(Debug, Clone)]
pub struct Funded {
    pub transfer: Confirmation,
    pub batch: Confirmation,
    pub batch_size: usize,
}

impl Funded {
    /// Gas spent by both funding transactions.
    pub fn gas_used(&self) -> u64 {
        self.transfer.gas_used + self.batch.gas_used
    }
}

/// Creates the benchmark accounts and funds them through the distributor.
pub struct AccountProvisioner<'a, C: ?Sized> {
    client: &'a C,
    distributor: Address,
    policy: &'a FundingPolicy,
    timeout: Duration,
}

impl<'a, C> AccountProvisioner<'a, C>
where
    C: ChainClient + ?Sized,
{
    pub fn new(
        client: &'a C,
        distributor: Address,
        policy: &'a FundingPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            distributor,
            policy,
            timeout,
        }
    }

    /// Generates `count` independent key pairs.
    pub fn generate(&self, count: u64) -> Vec<EphemeralAccount> {
        let accounts: Vec<_> = (0..count).map(|_| EphemeralAccount::random()).collect();
        info!(count = accounts.len(), "Generated benchmark accounts");
        accounts
    }

    /// Funds the distributor with `len * unit_funding_cost`, then credits every
    /// account in a single batched call. Both transactions are confirmed before
    /// returning; a revert of the batch leaves no account credited.
    pub async fn fund(&self, accounts: &[EphemeralAccount]) -> Result<Funded, BenchError> {
        let value = self.policy.distributor_funding(accounts.len() as u64);
        info!(
            distributor = %self.distributor,
            value = %format_ether(value),
            "Funding distributor"
        );
        let transfer = self
            .submit(
                ProvisioningStage::FundDistributor,
                TransactionRequest::default()
                    .to(self.distributor)
                    .value(value),
            )
            .await?;

        let batch = ProvisioningBatch::for_accounts(accounts);
        let batch_size = batch.len();
        info!(batch_size, "Crediting benchmark accounts");
        let confirmation = self
            .submit(
                ProvisioningStage::AddFunds,
                TransactionRequest::default()
                    .to(self.distributor)
                    .value(U256::ZERO)
                    .input(batch.to_call().abi_encode().into()),
            )
            .await?;

        info!(
            tx_hash = %confirmation.tx_hash,
            gas_used = confirmation.gas_used,
            batch_size,
            "Benchmark accounts funded"
        );

        Ok(Funded {
            transfer,
            batch: confirmation,
            batch_size,
        })
    }

    async fn submit(
        &self,
        stage: ProvisioningStage,
        request: TransactionRequest,
    ) -> Result<Confirmation, BenchError> {
        with_timeout(
            "provisioning transaction",
            self.timeout,
            self.client.transact(TxSigner::Operator, request),
        )
        .await
        .and_then(Confirmation::ensure_success)
        .map_err(|source| BenchError::Provisioning { stage, source })
    }
}
