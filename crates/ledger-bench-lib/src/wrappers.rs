// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::BenchmarkConfig,
    coordinator::BenchmarkCoordinator,
    error::{Error, Result},
    ledger::{LedgerConnector, simulated::SimulatedLedger},
    report::BenchmarkReport,
    types::AccountIdentity,
};
use std::sync::Arc;

pub async fn run_benchmark(
    config: BenchmarkConfig,
    connector: Arc<dyn LedgerConnector>,
    accounts: &[AccountIdentity],
) -> Result<BenchmarkReport> {
    BenchmarkCoordinator::new(config, connector)
        .run(accounts)
        .await
}

/// Addresses for a simulated run with `count` accounts.
pub fn generated_addresses(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("0x{:040x}", n)).collect()
}

/// Drives the first `accounts` addresses of the config against an in-process
/// ledger. Without configured addresses, `accounts` addresses are generated.
pub async fn run_simulated(
    mut config: BenchmarkConfig,
    ledger: SimulatedLedger,
    accounts: usize,
) -> Result<BenchmarkReport> {
    if config.addresses.is_empty() {
        config.addresses = generated_addresses(accounts.max(2));
    }
    if accounts > config.addresses.len() {
        return Err(Error::InvalidConfiguration(format!(
            "cannot drive {} accounts with only {} addresses",
            accounts,
            config.addresses.len()
        )));
    }
    let identities: Vec<_> = config
        .addresses
        .iter()
        .take(accounts)
        .map(AccountIdentity::new)
        .collect();
    run_benchmark(config, Arc::new(ledger), &identities).await
}
