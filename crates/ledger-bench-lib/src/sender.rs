// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::StopCondition,
    counters,
    error::{Error, Result},
    ledger::LedgerClient,
    metrics::Metrics,
    pending::PendingTracker,
    selector::PeerSelector,
    types::{Address, AddressSet, Transfer},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct SenderParams {
    /// `count` is compared against this node's submitted transfers.
    pub stop: StopCondition,
    pub interval: Duration,
    pub inflight_limit: Option<usize>,
    pub amount: u64,
    pub gas_limit: u64,
    /// Whether submitted transfers go into the pending tracker. Nodes without
    /// a poller never confirm anything, so they neither track nor back off.
    pub track_pending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderSummary {
    pub elapsed: Duration,
    pub submitted: u64,
    pub next_nonce: u64,
}

/// Submits transfers from one account until its stop condition fires.
pub struct SenderLoop {
    node: usize,
    address: Address,
    addresses: AddressSet,
    client: Arc<dyn LedgerClient>,
    tracker: Arc<PendingTracker>,
    metrics: Arc<Metrics>,
    selector: PeerSelector,
    nonce: u64,
    params: SenderParams,
}

impl SenderLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: usize,
        address: Address,
        addresses: AddressSet,
        client: Arc<dyn LedgerClient>,
        tracker: Arc<PendingTracker>,
        metrics: Arc<Metrics>,
        selector: PeerSelector,
        starting_nonce: u64,
        params: SenderParams,
    ) -> Self {
        Self {
            node,
            address,
            addresses,
            client,
            tracker,
            metrics,
            selector,
            nonce: starting_nonce,
            params,
        }
    }

    pub async fn run(mut self) -> Result<SenderSummary> {
        let start = Instant::now();
        info!(
            node = self.node,
            address = %self.address,
            nonce = self.nonce,
            inflight_limit = ?self.params.inflight_limit,
            "Sender started"
        );

        // The stop condition is only checked here; a submission in progress
        // always completes first.
        while !self
            .params
            .stop
            .reached(start.elapsed(), self.metrics.submitted())
        {
            self.step().await?;
            pause(self.params.interval).await;
        }

        let summary = SenderSummary {
            elapsed: start.elapsed(),
            submitted: self.metrics.submitted(),
            next_nonce: self.nonce,
        };
        info!(
            node = self.node,
            submitted = summary.submitted,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Sender stopped"
        );
        Ok(summary)
    }

    async fn step(&mut self) -> Result<()> {
        if self.params.track_pending {
            if let Some(limit) = self.params.inflight_limit {
                if self.tracker.len() >= limit {
                    self.metrics.record_skipped();
                    return Ok(());
                }
            }
        }

        let peer = self.selector.choose(self.address.index(), self.addresses.len())?;
        let transfer = Transfer {
            from: self.address.clone(),
            to: self.addresses[peer].clone(),
            amount: self.params.amount,
            gas_limit: self.params.gas_limit,
            nonce: self.nonce,
        };

        let submitted_at = Instant::now();
        match self.client.submit_transfer(&transfer).await {
            Ok(id) => {
                debug!(node = self.node, nonce = self.nonce, to = %transfer.to, txn = %id, "Submitted transfer");
                self.metrics.record_submitted();
                if self.params.track_pending {
                    self.tracker.insert(id, submitted_at)?;
                    counters::record_tracked();
                    self.metrics.record_in_flight(self.tracker.len());
                }
                self.nonce += 1;
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                warn!(node = self.node, nonce = self.nonce, error = %e, "Submission not acknowledged yet, retrying next iteration");
                Ok(())
            },
            Err(source) => Err(Error::Submission {
                node: self.node,
                nonce: self.nonce,
                source,
            }),
        }
    }
}

/// Suspends between iterations. A zero interval still yields, so a poller
/// interleaved on the same task gets to run.
pub(crate) async fn pause(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(interval).await;
    }
}
