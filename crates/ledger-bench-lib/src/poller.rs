// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{ConfirmationStrategy, StopCondition},
    error::{Error, Result},
    ledger::{LedgerClient, LedgerError},
    metrics::Metrics,
    pending::PendingTracker,
    types::{BlockId, TxnId},
};
use once_cell::sync::OnceCell;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct PollerParams {
    /// `count` is compared against this node's confirmed transfers.
    pub stop: StopCondition,
    pub interval: Duration,
    /// Once the sender is done, how long to keep waiting for stragglers.
    pub drain_timeout: Duration,
    pub strategy: ConfirmationStrategy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollerSummary {
    pub elapsed: Duration,
    pub confirmed: u64,
    pub average_latency: Option<Duration>,
    /// Transfers still unconfirmed when the poller stopped.
    pub abandoned: usize,
}

/// Watches new blocks for the node's own pending transfers and records
/// their confirmation latency.
pub struct ConfirmationPoller {
    node: usize,
    client: Arc<dyn LedgerClient>,
    tracker: Arc<PendingTracker>,
    metrics: Arc<Metrics>,
    params: PollerParams,
    sender_finished: Arc<OnceCell<Instant>>,
}

impl ConfirmationPoller {
    /// `sender_finished` is filled in by the node when its sender returns.
    pub fn new(
        node: usize,
        client: Arc<dyn LedgerClient>,
        tracker: Arc<PendingTracker>,
        metrics: Arc<Metrics>,
        params: PollerParams,
        sender_finished: Arc<OnceCell<Instant>>,
    ) -> Self {
        Self {
            node,
            client,
            tracker,
            metrics,
            params,
            sender_finished,
        }
    }

    pub async fn run(self) -> Result<PollerSummary> {
        let start = Instant::now();
        info!(node = self.node, strategy = ?self.params.strategy, "Confirmation poller started");

        while !self.should_stop(start) {
            self.poll_once().await?;
            tokio::time::sleep(self.params.interval).await;
        }

        let stats = self.metrics.snapshot();
        let summary = PollerSummary {
            elapsed: start.elapsed(),
            confirmed: stats.confirmed,
            average_latency: stats.average_latency(),
            abandoned: self.tracker.len(),
        };
        if summary.abandoned > 0 {
            warn!(
                node = self.node,
                abandoned = summary.abandoned,
                "Confirmation poller stopped with unconfirmed transfers"
            );
        }
        info!(
            node = self.node,
            confirmed = summary.confirmed,
            average_latency_ms = summary.average_latency.map(|l| l.as_millis() as u64),
            "Confirmation poller stopped"
        );
        Ok(summary)
    }

    fn should_stop(&self, start: Instant) -> bool {
        if self
            .params
            .stop
            .reached(start.elapsed(), self.metrics.confirmed())
        {
            return true;
        }
        match self.sender_finished.get() {
            Some(finished_at) => {
                self.tracker.is_empty() || finished_at.elapsed() >= self.params.drain_timeout
            },
            None => false,
        }
    }

    /// One pass over the blocks produced since the previous pass.
    pub async fn poll_once(&self) -> Result<()> {
        let blocks = self
            .client
            .fetch_new_blocks()
            .await
            .map_err(|source| self.lookup_error("new blocks", source))?;
        if blocks.is_empty() {
            return Ok(());
        }

        for block in &blocks {
            let Some(transactions) = self.block_transactions(block).await? else {
                continue;
            };
            self.metrics.record_block(transactions.len());
            if self.params.strategy == ConfirmationStrategy::BlockScan {
                let now = Instant::now();
                for id in &transactions {
                    self.confirm(id, now);
                }
            }
        }

        if self.params.strategy == ConfirmationStrategy::PendingLookup {
            self.lookup_pending().await?;
        }
        Ok(())
    }

    /// `None` when the ledger no longer knows the block.
    async fn block_transactions(&self, block: &BlockId) -> Result<Option<Vec<TxnId>>> {
        match self.client.fetch_block_transactions(block).await {
            Ok(transactions) => Ok(Some(transactions)),
            Err(e) if e.is_not_found() => {
                debug!(node = self.node, block = %block, "Skipping unknown block");
                Ok(None)
            },
            Err(source) => Err(self.lookup_error(&format!("block {}", block), source)),
        }
    }

    async fn lookup_pending(&self) -> Result<()> {
        for id in self.tracker.snapshot_ids() {
            match self.client.fetch_transaction(&id).await {
                Ok(txn) if txn.is_included() => self.confirm(&id, Instant::now()),
                Ok(_) => {},
                Err(e) if e.is_not_found() => {},
                Err(source) => {
                    return Err(self.lookup_error(&format!("transaction {}", id), source));
                },
            }
        }
        Ok(())
    }

    /// Ids that belong to other senders are ignored.
    fn confirm(&self, id: &TxnId, confirmed_at: Instant) {
        if let Some(submitted_at) = self.tracker.confirm_and_remove(id) {
            let latency = confirmed_at.saturating_duration_since(submitted_at);
            self.metrics.record_confirmed(latency);
            debug!(node = self.node, txn = %id, latency_ms = latency.as_millis() as u64, "Confirmed transfer");
        }
    }

    fn lookup_error(&self, what: &str, source: LedgerError) -> Error {
        Error::Lookup {
            node: self.node,
            what: what.to_string(),
            source,
        }
    }
}
