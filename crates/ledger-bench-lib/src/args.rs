// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{BenchmarkConfig, ConfirmationStrategy, ExecutionMode, ObserverSelection},
    error::{Error, Result},
};
use clap::Parser;
use std::{path::PathBuf, str::FromStr};

impl FromStr for ObserverSelection {
    type Err = Error;

    /// `all`, or the position of the single observing account.
    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<usize>().map(Self::Single).map_err(|_| {
            Error::InvalidConfiguration(format!(
                "observer must be \"all\" or an account position, got {:?}",
                s
            ))
        })
    }
}

/// Workload knobs shared by every subcommand that generates load. Flags
/// override values loaded from `--config`.
#[derive(Clone, Debug, Default, Parser)]
pub struct WorkloadArgs {
    /// YAML file with a full benchmark configuration.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Transfer recipients. Repeat for each address.
    #[clap(long = "address")]
    pub addresses: Vec<String>,

    /// Max unconfirmed transfers per account before the sender backs off.
    #[clap(long)]
    pub inflight_limit: Option<usize>,

    /// Transfers per account before stopping.
    #[clap(long)]
    pub count: Option<u64>,

    /// Run time in seconds. If neither this nor --count is given, the
    /// configured stop condition applies.
    #[clap(long)]
    pub duration_secs: Option<u64>,

    #[clap(long)]
    pub send_interval_ms: Option<u64>,

    #[clap(long)]
    pub poll_interval_ms: Option<u64>,

    /// How long pollers keep waiting for confirmations after sending stops.
    #[clap(long)]
    pub drain_timeout_secs: Option<u64>,

    #[clap(long)]
    pub amount: Option<u64>,

    #[clap(long)]
    pub gas_limit: Option<u64>,

    /// Which accounts track confirmations: "all" or one account position.
    #[clap(long)]
    pub observer: Option<ObserverSelection>,

    /// Run each account's sender and poller on separate tasks.
    #[clap(long)]
    pub parallel: bool,

    /// Confirm by looking up each pending transfer instead of scanning
    /// block contents.
    #[clap(long)]
    pub pending_lookup: bool,

    /// Seed for peer selection, for reproducible runs.
    #[clap(long)]
    pub seed: Option<u64>,
}

impl WorkloadArgs {
    /// Loads `--config` if given, else starts from defaults, then applies
    /// every flag that was set.
    pub fn to_config(&self) -> Result<BenchmarkConfig> {
        let config = match &self.config {
            Some(path) => BenchmarkConfig::load_config(path)?,
            None => BenchmarkConfig::default(),
        };
        Ok(self.apply_to(config))
    }

    pub fn apply_to(&self, mut config: BenchmarkConfig) -> BenchmarkConfig {
        if !self.addresses.is_empty() {
            config.addresses = self.addresses.clone();
        }
        if self.count.is_some() || self.duration_secs.is_some() {
            config.target_count = self.count;
            config.duration_secs = self.duration_secs;
        }
        if let Some(limit) = self.inflight_limit {
            config.inflight_limit = Some(limit);
        }
        if let Some(interval) = self.send_interval_ms {
            config.send_interval_ms = interval;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.poll_interval_ms = interval;
        }
        if let Some(timeout) = self.drain_timeout_secs {
            config.drain_timeout_secs = timeout;
        }
        if let Some(amount) = self.amount {
            config.transfer_amount = amount;
        }
        if let Some(gas_limit) = self.gas_limit {
            config.gas_limit = gas_limit;
        }
        if let Some(observer) = self.observer {
            config.observers = observer;
        }
        if self.parallel {
            config.execution = ExecutionMode::Parallel;
        }
        if self.pending_lookup {
            config.confirmation = ConfirmationStrategy::PendingLookup;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        config
    }
}
