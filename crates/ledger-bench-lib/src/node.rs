// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{BenchmarkConfig, ConfirmationStrategy, ExecutionMode, StopCondition},
    counters,
    error::{Error, Result},
    ledger::LedgerClient,
    metrics::Metrics,
    pending::PendingTracker,
    poller::{ConfirmationPoller, PollerParams, PollerSummary},
    report::NodeReport,
    selector::PeerSelector,
    sender::{SenderLoop, SenderParams, SenderSummary},
    types::{Address, AddressSet},
};
use once_cell::sync::OnceCell;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinSet, time::Instant};
use tracing::{info, warn};

/// The per-node slice of a [`BenchmarkConfig`].
#[derive(Clone, Debug)]
pub struct NodeSettings {
    pub stop: StopCondition,
    pub send_interval: Duration,
    pub poll_interval: Duration,
    pub drain_timeout: Duration,
    pub inflight_limit: Option<usize>,
    pub amount: u64,
    pub gas_limit: u64,
    pub execution: ExecutionMode,
    pub confirmation: ConfirmationStrategy,
}

impl From<&BenchmarkConfig> for NodeSettings {
    fn from(config: &BenchmarkConfig) -> Self {
        Self {
            stop: config.stop_condition(),
            send_interval: config.send_interval_duration(),
            poll_interval: config.poll_interval_duration(),
            drain_timeout: config.drain_timeout_duration(),
            inflight_limit: config.inflight_limit,
            amount: config.transfer_amount,
            gas_limit: config.gas_limit,
            execution: config.execution,
            confirmation: config.confirmation,
        }
    }
}

/// Empties the tracker and releases its entries from the pending gauge when
/// dropped, so an aborted node leaves nothing behind.
struct AbandonOnDrop(Arc<PendingTracker>);

impl AbandonOnDrop {
    fn abandon(&self) -> usize {
        let abandoned = self.0.clear();
        counters::record_abandoned(abandoned);
        abandoned
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.abandon();
    }
}

enum LoopOutcome {
    Sender(SenderSummary),
    Poller(PollerSummary),
}

/// One driven account: a sender loop and, if the node observes, a
/// confirmation poller sharing a pending tracker and a metrics record.
pub struct WorkerNode {
    index: usize,
    address: Address,
    addresses: AddressSet,
    client: Arc<dyn LedgerClient>,
    selector: PeerSelector,
    starting_nonce: u64,
    observer: bool,
    settings: NodeSettings,
    tracker: Arc<PendingTracker>,
    metrics: Arc<Metrics>,
}

impl WorkerNode {
    pub fn new(
        index: usize,
        address: Address,
        addresses: AddressSet,
        client: Arc<dyn LedgerClient>,
        selector: PeerSelector,
        settings: NodeSettings,
    ) -> Self {
        Self {
            index,
            address,
            addresses,
            client,
            selector,
            starting_nonce: 0,
            observer: true,
            settings,
            tracker: Arc::new(PendingTracker::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn starting_nonce(mut self, nonce: u64) -> Self {
        self.starting_nonce = nonce;
        self
    }

    pub fn observer(mut self, observer: bool) -> Self {
        self.observer = observer;
        self
    }

    /// Live view of this node's counters.
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub async fn run(self) -> Result<NodeReport> {
        let start = Instant::now();
        info!(
            node = self.index,
            address = %self.address,
            observer = self.observer,
            execution = ?self.settings.execution,
            "Worker node started"
        );

        let leftovers = AbandonOnDrop(self.tracker.clone());
        let sender_finished = Arc::new(OnceCell::new());
        let sender = SenderLoop::new(
            self.index,
            self.address.clone(),
            self.addresses.clone(),
            self.client.clone(),
            self.tracker.clone(),
            self.metrics.clone(),
            self.selector,
            self.starting_nonce,
            SenderParams {
                stop: self.settings.stop,
                interval: self.settings.send_interval,
                inflight_limit: self.settings.inflight_limit,
                amount: self.settings.amount,
                gas_limit: self.settings.gas_limit,
                track_pending: self.observer,
            },
        );
        let sender = {
            let finished = sender_finished.clone();
            async move {
                let result = sender.run().await;
                let _ = finished.set(Instant::now());
                result
            }
        };

        let result = if self.observer {
            let poller = ConfirmationPoller::new(
                self.index,
                self.client.clone(),
                self.tracker.clone(),
                self.metrics.clone(),
                PollerParams {
                    stop: self.settings.stop,
                    interval: self.settings.poll_interval,
                    drain_timeout: self.settings.drain_timeout,
                    strategy: self.settings.confirmation,
                },
                sender_finished,
            );
            match self.settings.execution {
                ExecutionMode::Cooperative => futures::future::try_join(sender, poller.run())
                    .await
                    .map(|_| ()),
                ExecutionMode::Parallel => run_parallel(sender, poller.run()).await,
            }
        } else {
            sender.await.map(|_| ())
        };

        let abandoned = leftovers.abandon();
        if let Err(e) = result {
            warn!(node = self.index, error = %e, "Worker node failed");
            return Err(e);
        }

        let report = NodeReport::new(
            self.index,
            self.address.to_string(),
            self.observer,
            start.elapsed(),
            self.metrics.snapshot(),
        );
        info!(
            node = self.index,
            submitted = report.stats.submitted,
            confirmed = report.stats.confirmed,
            abandoned,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Worker node finished"
        );
        Ok(report)
    }
}

/// Runs both loops on their own tasks. Dropping the set aborts whatever is
/// still running, so the first failure cancels the other loop.
async fn run_parallel(
    sender: impl std::future::Future<Output = Result<SenderSummary>> + Send + 'static,
    poller: impl std::future::Future<Output = Result<PollerSummary>> + Send + 'static,
) -> Result<()> {
    let mut loops = JoinSet::new();
    loops.spawn(async move { sender.await.map(LoopOutcome::Sender) });
    loops.spawn(async move { poller.await.map(LoopOutcome::Poller) });
    while let Some(joined) = loops.join_next().await {
        match joined.map_err(Error::from)?? {
            LoopOutcome::Sender(summary) => {
                info!(submitted = summary.submitted, "Sender task joined");
            },
            LoopOutcome::Poller(summary) => {
                info!(confirmed = summary.confirmed, "Poller task joined");
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::simulated::SimulatedLedger;
    use claims::{assert_err, assert_matches, assert_ok};

    fn settings(execution: ExecutionMode) -> NodeSettings {
        NodeSettings::from(
            &BenchmarkConfig::new(["0xa0", "0xa1", "0xa2"])
                .target_count(25)
                .send_interval(Duration::from_millis(10))
                .poll_interval(Duration::from_millis(50))
                .inflight_limit(8)
                .execution(execution),
        )
    }

    fn node(ledger: &SimulatedLedger, settings: NodeSettings) -> WorkerNode {
        let addresses = AddressSet::new(["0xa0", "0xa1", "0xa2"]).unwrap();
        WorkerNode::new(
            0,
            addresses[0].clone(),
            addresses,
            Arc::new(ledger.client()),
            PeerSelector::from_seed(3),
            settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_node_confirms_everything_it_sends() {
        let ledger = SimulatedLedger::new(Duration::from_millis(100), 100);
        let report = assert_ok!(node(&ledger, settings(ExecutionMode::Cooperative)).run().await);
        assert_eq!(report.stats.submitted, 25);
        assert_eq!(report.stats.confirmed, 25);
        assert!(report.stats.peak_in_flight <= 8);
        assert!(report.average_latency.is_some());
        assert_eq!(ledger.submitted_by("0xa0"), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_node_confirms_everything_it_sends() {
        let ledger = SimulatedLedger::new(Duration::from_millis(100), 100);
        let report = assert_ok!(node(&ledger, settings(ExecutionMode::Parallel)).run().await);
        assert_eq!(report.stats.submitted, 25);
        assert_eq!(report.stats.confirmed, 25);
        assert!(report.stats.peak_in_flight <= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn non_observer_only_sends() {
        let ledger = SimulatedLedger::new(Duration::from_millis(100), 100);
        let report = assert_ok!(
            node(&ledger, settings(ExecutionMode::Cooperative))
                .observer(false)
                .run()
                .await
        );
        assert!(!report.observer);
        assert_eq!(report.stats.submitted, 25);
        assert_eq!(report.stats.confirmed, 0);
        assert_eq!(report.stats.blocks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_from_starting_nonce() {
        let ledger = SimulatedLedger::new(Duration::from_millis(100), 100);
        let result = node(&ledger, settings(ExecutionMode::Cooperative))
            .starting_nonce(7)
            .run()
            .await;
        // The ledger expects nonce 0 for a fresh account.
        assert_matches!(result, Err(Error::Submission { nonce: 7, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_surface_in_both_modes() {
        for execution in [ExecutionMode::Cooperative, ExecutionMode::Parallel] {
            let ledger = SimulatedLedger::new(Duration::from_millis(100), 100);
            ledger.fail_submissions_from_nonce(5);
            let result = node(&ledger, settings(execution)).run().await;
            assert_matches!(result, Err(Error::Submission { nonce: 5, .. }));
            assert_eq!(ledger.submitted_by("0xa0"), 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_node_releases_its_pending_entries() {
        // Blocks only every minute: the sender stalls at the in-flight limit.
        let ledger = SimulatedLedger::new(Duration::from_secs(60), 100);
        let node = node(&ledger, settings(ExecutionMode::Cooperative));
        let tracker = node.tracker.clone();
        let run = tokio::spawn(node.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tracker.len(), 8);
        run.abort();
        assert_err!(run.await);
        assert!(tracker.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn confirmed_never_exceeds_submitted_while_running() {
        let ledger = SimulatedLedger::new(Duration::from_millis(5), 1_000);
        let node = node(
            &ledger,
            NodeSettings::from(
                &BenchmarkConfig::new(["0xa0", "0xa1", "0xa2"])
                    .duration_secs(1)
                    .send_interval(Duration::from_millis(1))
                    .poll_interval(Duration::from_millis(2))
                    .execution(ExecutionMode::Parallel),
            ),
        );
        let metrics = node.metrics();
        let run = tokio::spawn(node.run());

        let mut samples = 0u64;
        while !run.is_finished() {
            let stats = metrics.snapshot();
            assert!(
                stats.confirmed <= stats.submitted,
                "confirmed {} > submitted {}",
                stats.confirmed,
                stats.submitted
            );
            samples += 1;
            tokio::task::yield_now().await;
        }
        let report = assert_ok!(run.await.unwrap());
        assert!(samples > 0);
        assert!(report.stats.confirmed > 0);
        assert!(report.stats.confirmed <= report.stats.submitted);
    }
}
