// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::BenchmarkConfig,
    error::{Error, Result},
    ledger::LedgerConnector,
    node::{NodeSettings, WorkerNode},
    report::BenchmarkReport,
    selector::PeerSelector,
    types::{AccountIdentity, AddressSet, canonicalize_address},
};
use futures::future::try_join_all;
use itertools::Itertools;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Drives one worker node per account and aggregates their reports.
pub struct BenchmarkCoordinator {
    config: BenchmarkConfig,
    connector: Arc<dyn LedgerConnector>,
}

impl BenchmarkCoordinator {
    pub fn new(config: BenchmarkConfig, connector: Arc<dyn LedgerConnector>) -> Self {
        Self { config, connector }
    }

    /// Connects every account, then runs all nodes concurrently. The first
    /// node to fail aborts the others and its error is returned.
    pub async fn run(&self, accounts: &[AccountIdentity]) -> Result<BenchmarkReport> {
        let addresses = self.config.validate(accounts.len())?;
        let nodes = self.prepare_nodes(&addresses, accounts).await?;

        info!(
            nodes = nodes.len(),
            addresses = addresses.len(),
            stop = ?self.config.stop_condition(),
            "Starting benchmark"
        );
        let mut tasks = JoinSet::new();
        for node in nodes {
            tasks.spawn(node.run());
        }

        let mut reports = Vec::with_capacity(accounts.len());
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(Error::from).and_then(|result| result) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(error = %e, label = e.get_label(), "Benchmark aborted");
                    tasks.abort_all();
                    return Err(e);
                },
            }
        }

        let report = BenchmarkReport::from_nodes(reports);
        info!(
            submitted = report.submitted,
            confirmed = report.confirmed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Benchmark finished"
        );
        Ok(report)
    }

    async fn prepare_nodes(
        &self,
        addresses: &AddressSet,
        accounts: &[AccountIdentity],
    ) -> Result<Vec<WorkerNode>> {
        if let Some(duplicate) = accounts
            .iter()
            .map(|account| canonicalize_address(&account.address))
            .duplicates()
            .next()
        {
            return Err(Error::InvalidConfiguration(format!(
                "account {} is driven more than once",
                duplicate
            )));
        }

        let settings = NodeSettings::from(&self.config);
        let setups = accounts.iter().enumerate().map(|(index, account)| {
            let settings = settings.clone();
            async move {
                let address = addresses.find(&account.address).cloned().ok_or_else(|| {
                    Error::InvalidConfiguration(format!(
                        "account {} is not in the address set",
                        account.address
                    ))
                })?;
                let client = self
                    .connector
                    .connect(account)
                    .await
                    .map_err(|source| Error::Connect {
                        address: address.to_string(),
                        source,
                    })?;
                let nonce = client
                    .fetch_account_nonce(&address)
                    .await
                    .map_err(|source| Error::Lookup {
                        node: index,
                        what: "account nonce".to_string(),
                        source,
                    })?;
                let selector = match self.config.seed {
                    Some(seed) => PeerSelector::from_seed(seed.wrapping_add(index as u64)),
                    None => PeerSelector::from_entropy()?,
                };
                info!(node = index, address = %address, nonce, "Connected account");
                Ok::<_, Error>(
                    WorkerNode::new(index, address, addresses.clone(), client, selector, settings)
                        .starting_nonce(nonce)
                        .observer(self.config.observers.observes(index)),
                )
            }
        });
        try_join_all(setups).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerClient, LedgerError, simulated::SimulatedLedger};
    use async_trait::async_trait;
    use claims::{assert_matches, assert_ok};
    use std::time::Duration;

    struct RefusingConnector;

    #[async_trait]
    impl LedgerConnector for RefusingConnector {
        async fn connect(
            &self,
            identity: &AccountIdentity,
        ) -> std::result::Result<Arc<dyn LedgerClient>, LedgerError> {
            Err(LedgerError::Rpc {
                code: -32000,
                message: format!("could not unlock {}", identity.address),
            })
        }
    }

    fn accounts(addresses: &[&str]) -> Vec<AccountIdentity> {
        addresses.iter().map(|a| AccountIdentity::new(*a)).collect()
    }

    fn config() -> BenchmarkConfig {
        BenchmarkConfig::new(["0xa0", "0xa1", "0xa2", "0xa3"])
            .target_count(10)
            .send_interval(Duration::from_millis(10))
            .poll_interval(Duration::from_millis(50))
            .seed(11)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_every_account() {
        let ledger = SimulatedLedger::new(Duration::from_millis(100), 100);
        let coordinator = BenchmarkCoordinator::new(config(), Arc::new(ledger.clone()));
        let report = assert_ok!(coordinator.run(&accounts(&["0xa0", "0xa2"])).await);
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.submitted, 20);
        assert_eq!(report.confirmed, 20);
        assert_eq!(report.nodes[1].address, "0xa2");
        assert_eq!(ledger.submitted_by("0xa2"), 10);
        assert_eq!(ledger.submitted_by("0xa1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_unknown_and_duplicate_accounts() {
        let ledger = SimulatedLedger::default();
        let coordinator = BenchmarkCoordinator::new(config(), Arc::new(ledger.clone()));
        assert_matches!(
            coordinator.run(&accounts(&["0xff"])).await,
            Err(Error::InvalidConfiguration(_))
        );
        assert_matches!(
            coordinator.run(&accounts(&["0xa0", "0xA0"])).await,
            Err(Error::InvalidConfiguration(_))
        );
        assert_eq!(ledger.total_submitted(), 0);
    }

    #[tokio::test]
    async fn connection_failures_are_reported_per_account() {
        let coordinator = BenchmarkCoordinator::new(config(), Arc::new(RefusingConnector));
        let err = coordinator.run(&accounts(&["0xa1"])).await.unwrap_err();
        assert_eq!(err.get_label(), "connect_error");
        assert!(err.to_string().contains("0xa1"));
    }
}
