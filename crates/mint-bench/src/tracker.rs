//! Completion tracking for the mint phase.
//!
//! Two independent signals are kept:
//! - the fan-in over every mint's receipt, collected as [`MintOutcome`]s, which
//!   defines completion and drives timing;
//! - an [`EventCounter`] that counts `Transfer` logs emitted by the token and is
//!   only used as a cross-check.

use std::time::Duration;

use alloy::{
    primitives::{Address, B256},
    rpc::types::Filter,
    sol_types::SolEvent,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::{
    client::{ChainClient, Confirmation, LogSubscription, with_timeout},
    contracts::IMintableToken,
    error::ChainError,
};

/// Result of one mint, success or failure.
#[derive(Debug)]
pub struct MintOutcome {
    /// Account that signed the mint.
    pub account: Address,
    /// Time from dispatch until the receipt (or error) resolved.
    pub latency: Duration,
    pub result: Result<Confirmation, ChainError>,
}

/// A mint that did not confirm successfully.
#[derive(Debug, Clone, Serialize)]
pub struct MintFailure {
    pub account: Address,
    pub tx_hash: Option<B256>,
    pub error: String,
}

/// Aggregate of every mint outcome.
#[derive(Debug, Clone, Default)]
pub struct Settled {
    pub succeeded: u64,
    pub failures: Vec<MintFailure>,
    pub latencies: Vec<Duration>,
    pub gas_used: u64,
    /// Lowest and highest block holding a confirmed mint.
    pub blocks: Option<(u64, u64)>,
}

impl Settled {
    pub fn from_outcomes(outcomes: &[MintOutcome]) -> Self {
        let mut settled = Self::default();
        for outcome in outcomes {
            settled.latencies.push(outcome.latency);
            match &outcome.result {
                Ok(confirmation) => {
                    settled.succeeded += 1;
                    settled.gas_used += confirmation.gas_used;
                    if let Some(block) = confirmation.block_number {
                        settled.blocks = Some(match settled.blocks {
                            Some((first, last)) => (first.min(block), last.max(block)),
                            None => (block, block),
                        });
                    }
                }
                Err(err) => {
                    let tx_hash = match err {
                        ChainError::Reverted { tx_hash } => Some(*tx_hash),
                        _ => None,
                    };
                    settled.failures.push(MintFailure {
                        account: outcome.account,
                        tx_hash,
                        error: err.to_string(),
                    });
                }
            }
        }
        settled
    }

    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    /// Number of blocks the confirmed mints were spread over.
    pub fn blocks_spanned(&self) -> u64 {
        self.blocks.map_or(0, |(first, last)| last - first + 1)
    }
}

/// Final state of the event counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventTally {
    pub observed: u64,
    pub expected: u64,
}

impl EventTally {
    /// Whether every expected `Transfer` was seen. `false` means some mint
    /// failed or the subscription lost events.
    pub fn complete(&self) -> bool {
        self.observed >= self.expected
    }
}

/// Counts `Transfer` events of the token on a background task.
///
/// The subscription is removed on the node exactly once: when the count first
/// reaches `expected`, when [`finish`](Self::finish) gives up waiting, or when
/// the counter is dropped on an early exit.
pub struct EventCounter {
    expected: u64,
    count: watch::Receiver<u64>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl EventCounter {
    /// Subscribes to `Transfer` on `token`. The subscription is established
    /// before this returns.
    pub async fn start<C>(
        client: &C,
        token: Address,
        expected: u64,
        timeout: Duration,
    ) -> Result<Self, ChainError>
    where
        C: ChainClient + ?Sized,
    {
        let filter = Filter::new()
            .address(token)
            .event_signature(IMintableToken::Transfer::SIGNATURE_HASH);
        let subscription = with_timeout(
            "event subscription",
            timeout,
            client.subscribe_logs(filter),
        )
        .await?;
        info!(%token, expected, id = %subscription.id(), "Subscribed to Transfer events");

        let (tx, count) = watch::channel(0);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(count_events(
            subscription,
            expected,
            tx,
            cancel.clone(),
            timeout,
        ));

        Ok(Self {
            expected,
            count,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }

    /// Events observed so far.
    pub fn observed(&self) -> u64 {
        *self.count.borrow()
    }

    /// Waits up to `grace` for the count to reach `target`, then releases the
    /// subscription and returns the tally.
    pub async fn finish(mut self, target: u64, grace: Duration) -> EventTally {
        let target = target.min(self.expected);
        let reached =
            tokio::time::timeout(grace, self.count.wait_for(|observed| *observed >= target))
                .await
                .is_ok_and(|waited| waited.is_ok());
        if !reached {
            warn!(
                observed = self.observed(),
                target,
                ?grace,
                "Event counter still behind receipts, releasing subscription"
            );
        }

        self.cancel.cancel();
        if let Err(err) = (&mut self.task).await {
            warn!(%err, "Event counter task failed");
        }

        EventTally {
            observed: self.observed(),
            expected: self.expected,
        }
    }
}

async fn count_events(
    mut subscription: LogSubscription,
    expected: u64,
    count: watch::Sender<u64>,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let mut observed = 0u64;
    while observed < expected {
        let log = tokio::select! {
            _ = cancel.cancelled() => break,
            log = subscription.next() => log,
        };
        let Some(log) = log else {
            warn!(observed, expected, "Event stream ended early");
            break;
        };
        if log.topic0() != Some(&IMintableToken::Transfer::SIGNATURE_HASH) {
            continue;
        }

        observed += 1;
        count.send_replace(observed);
        info!(count = observed, expected, "Listener event count");
    }

    let id = subscription.id();
    match with_timeout("unsubscribe", timeout, subscription.unsubscribe()).await {
        Ok(()) => debug!(%id, observed, expected, "Unsubscribed from Transfer events"),
        Err(err) => warn!(%id, %err, "Failed to remove Transfer subscription"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation(gas_used: u64, block: u64) -> Confirmation {
        Confirmation {
            tx_hash: B256::repeat_byte(0x01),
            success: true,
            block_number: Some(block),
            gas_used,
            contract_address: None,
        }
    }

    #[test]
    fn settled_splits_successes_and_failures() {
        let reverted = B256::repeat_byte(0xAB);
        let outcomes = vec![
            MintOutcome {
                account: Address::repeat_byte(0x01),
                latency: Duration::from_millis(10),
                result: Ok(confirmation(50_000, 12)),
            },
            MintOutcome {
                account: Address::repeat_byte(0x02),
                latency: Duration::from_millis(20),
                result: Err(ChainError::Reverted { tx_hash: reverted }),
            },
            MintOutcome {
                account: Address::repeat_byte(0x03),
                latency: Duration::from_millis(30),
                result: Ok(confirmation(51_000, 10)),
            },
        ];

        let settled = Settled::from_outcomes(&outcomes);
        assert_eq!(settled.succeeded, 2);
        assert_eq!(settled.failed(), 1);
        assert_eq!(settled.gas_used, 101_000);
        assert_eq!(settled.latencies.len(), 3);
        assert_eq!(settled.failures[0].account, Address::repeat_byte(0x02));
        assert_eq!(settled.failures[0].tx_hash, Some(reverted));
        assert_eq!(settled.blocks, Some((10, 12)));
        assert_eq!(settled.blocks_spanned(), 3);
    }

    #[test]
    fn no_confirmed_mints_span_no_blocks() {
        let settled = Settled::from_outcomes(&[MintOutcome {
            account: Address::repeat_byte(0x04),
            latency: Duration::from_millis(5),
            result: Err(ChainError::Timeout {
                operation: "mint",
                timeout: Duration::from_secs(1),
            }),
        }]);
        assert_eq!(settled.blocks, None);
        assert_eq!(settled.blocks_spanned(), 0);
        assert_eq!(settled.failures[0].tx_hash, None);
    }

    #[test]
    fn tally_completion() {
        assert!(
            EventTally {
                observed: 3,
                expected: 3
            }
            .complete()
        );
        assert!(
            !EventTally {
                observed: 2,
                expected: 3
            }
            .complete()
        );
        assert!(
            EventTally {
                observed: 0,
                expected: 0
            }
            .complete()
        );
    }
}
