//! Chain access used by the benchmark.
//!
//! [`ChainClient`] is the seam between the orchestration logic and the RPC
//! endpoint. [`RpcChainClient`] is the alloy-backed implementation; tests
//! drive the same logic through an in-memory chain.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, B256, Bytes, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::{
        client::{ClientBuilder, RpcClient},
        types::{Filter, Log, TransactionReceipt, TransactionRequest},
    },
    signers::local::PrivateKeySigner,
};
use futures::{
    FutureExt, Stream, StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use tracing::{debug, warn};

use crate::error::ChainError;

/// Poll interval for log filters on HTTP endpoints.
const LOG_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Stream of logs matching a subscription filter.
pub type LogStream = BoxStream<'static, Log>;

/// Node-side identifier of a log subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionId {
    /// `eth_subscribe` over a pubsub transport.
    Pubsub(B256),
    /// `eth_newFilter` polled with `eth_getFilterChanges`.
    Filter(U256),
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pubsub(id) => write!(f, "subscription {id}"),
            Self::Filter(id) => write!(f, "filter {id:#x}"),
        }
    }
}

/// Live log subscription.
///
/// Dropping the handle only stops local delivery; the node keeps the
/// subscription until [`unsubscribe`](Self::unsubscribe) runs, which consumes
/// the handle so it can happen at most once.
pub struct LogSubscription {
    id: SubscriptionId,
    logs: LogStream,
    release: BoxFuture<'static, Result<(), ChainError>>,
}

impl LogSubscription {
    /// `release` must remove the subscription on the node. It is only polled
    /// by [`unsubscribe`](Self::unsubscribe).
    pub fn new<F>(id: SubscriptionId, logs: LogStream, release: F) -> Self
    where
        F: Future<Output = Result<(), ChainError>> + Send + 'static,
    {
        Self {
            id,
            logs,
            release: release.boxed(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops delivery and removes the subscription on the node.
    pub async fn unsubscribe(self) -> Result<(), ChainError> {
        drop(self.logs);
        self.release.await
    }
}

impl fmt::Debug for LogSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Stream for LogSubscription {
    type Item = Log;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Log>> {
        self.logs.poll_next_unpin(cx)
    }
}

/// Key that signs a transaction.
#[derive(Debug, Clone, Copy)]
pub enum TxSigner<'a> {
    /// The funded operator account the client was built with.
    Operator,
    /// A benchmark account generated for this run.
    Account(&'a PrivateKeySigner),
}

/// Settled transaction, reduced to what the benchmark inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

impl Confirmation {
    pub fn from_receipt(receipt: &TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            contract_address: receipt.contract_address,
        }
    }

    /// Turns a reverted confirmation into [`ChainError::Reverted`].
    pub fn ensure_success(self) -> Result<Self, ChainError> {
        if self.success {
            Ok(self)
        } else {
            Err(ChainError::Reverted {
                tx_hash: self.tx_hash,
            })
        }
    }
}

#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the operator account.
    fn operator(&self) -> Address;

    /// Native-currency balance of `address`.
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Signs and submits `request`, then waits for its receipt.
    async fn transact(
        &self,
        signer: TxSigner<'_>,
        request: TransactionRequest,
    ) -> Result<Confirmation, ChainError>;

    /// Read-only call against the latest state.
    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError>;

    /// Subscribes to logs matching `filter`. The caller owns the returned
    /// handle and must [`unsubscribe`](LogSubscription::unsubscribe) it.
    async fn subscribe_logs(&self, filter: Filter) -> Result<LogSubscription, ChainError>;

    /// Deploys `bytecode` from the operator account and waits for confirmation.
    async fn deploy(&self, bytecode: Bytes) -> Result<Address, ChainError> {
        let request = TransactionRequest::default().with_deploy_code(bytecode);
        let confirmation = self
            .transact(TxSigner::Operator, request)
            .await?
            .ensure_success()?;

        confirmation
            .contract_address
            .ok_or(ChainError::MissingContractAddress {
                tx_hash: confirmation.tx_hash,
            })
    }
}

/// Bounds a suspended chain operation by `limit`.
pub async fn with_timeout<T, Fut>(
    operation: &'static str,
    limit: Duration,
    fut: Fut,
) -> Result<T, ChainError>
where
    Fut: Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout {
            operation,
            timeout: limit,
        }),
    }
}

/// [`ChainClient`] backed by an alloy provider.
pub struct RpcChainClient {
    rpc: RpcClient,
    provider: DynProvider,
    operator: Address,
    pubsub: bool,
}

impl RpcChainClient {
    /// Connect to `rpc_url` (http, https, ws or wss) with `operator` as the signer
    /// for deployments and funding.
    pub async fn connect(rpc_url: &str, operator: PrivateKeySigner) -> Result<Self, ChainError> {
        let rpc = ClientBuilder::default()
            .connect(rpc_url)
            .await
            .map_err(ChainError::rpc)?;
        let address = operator.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(operator))
            .connect_client(rpc.clone())
            .erased();

        Ok(Self {
            rpc,
            provider,
            operator: address,
            pubsub: rpc_url.starts_with("ws://") || rpc_url.starts_with("wss://"),
        })
    }

    /// Provider that signs with a benchmark account over the shared connection.
    fn account_provider(&self, signer: &PrivateKeySigner) -> DynProvider {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_client(self.rpc.clone())
            .erased()
    }
}

#[async_trait::async_trait]
impl ChainClient for RpcChainClient {
    fn operator(&self) -> Address {
        self.operator
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(ChainError::rpc)
    }

    async fn transact(
        &self,
        signer: TxSigner<'_>,
        request: TransactionRequest,
    ) -> Result<Confirmation, ChainError> {
        let (provider, from) = match signer {
            TxSigner::Operator => (self.provider.clone(), self.operator),
            TxSigner::Account(signer) => (self.account_provider(signer), signer.address()),
        };

        let pending = provider
            .send_transaction(request.from(from))
            .await
            .map_err(ChainError::rpc)?;
        debug!(tx_hash = %pending.tx_hash(), %from, "Transaction submitted");

        let receipt = pending.get_receipt().await.map_err(ChainError::rpc)?;
        Ok(Confirmation::from_receipt(&receipt))
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError> {
        self.provider.call(request).await.map_err(ChainError::rpc)
    }

    async fn subscribe_logs(&self, filter: Filter) -> Result<LogSubscription, ChainError> {
        if self.pubsub {
            let subscription = self
                .provider
                .subscribe_logs(&filter)
                .await
                .map_err(ChainError::subscription)?;
            let local_id = *subscription.local_id();
            let provider = self.provider.clone();
            return Ok(LogSubscription::new(
                SubscriptionId::Pubsub(local_id),
                subscription.into_stream().boxed(),
                async move { provider.unsubscribe(local_id).await.map_err(ChainError::subscription) },
            ));
        }

        let filter_id = self
            .provider
            .new_filter(&filter)
            .await
            .map_err(ChainError::subscription)?;
        let id = SubscriptionId::Filter(filter_id);
        let logs = stream::unfold(self.provider.clone(), move |provider| async move {
            tokio::time::sleep(LOG_POLL_INTERVAL).await;
            let logs = provider
                .get_filter_changes::<Log>(filter_id)
                .await
                .unwrap_or_else(|err| {
                    warn!(%err, %id, "Polling log filter failed");
                    Vec::new()
                });
            Some((logs, provider))
        })
        .flat_map(stream::iter)
        .boxed();

        let provider = self.provider.clone();
        Ok(LogSubscription::new(
            id,
            logs,
            async move {
                let removed = provider
                    .uninstall_filter(filter_id)
                    .await
                    .map_err(ChainError::subscription)?;
                if !removed {
                    debug!(%id, "Log filter already gone on the node");
                }
                Ok(())
            },
        ))
    }
}
