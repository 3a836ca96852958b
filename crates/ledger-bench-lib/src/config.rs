// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Error, Result},
    types::AddressSet,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

pub const DEFAULT_TRANSFER_AMOUNT: u64 = 100_000;
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_DURATION_SECS: u64 = 30;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 60;

/// Which worker nodes run a confirmation poller.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverSelection {
    #[default]
    All,
    /// Only the node at this position in the account list.
    Single(usize),
}

impl ObserverSelection {
    pub fn observes(&self, node_index: usize) -> bool {
        match self {
            Self::All => true,
            Self::Single(observer) => *observer == node_index,
        }
    }
}

/// How a node schedules its sender and its poller.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Both loops interleave on the node's task.
    #[default]
    Cooperative,
    /// Each loop gets its own task and may run on its own worker thread.
    Parallel,
}

/// How a poller decides that one of its transfers is confirmed.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStrategy {
    /// Match every transaction id of every new block against the pending set.
    #[default]
    BlockScan,
    /// On every new block, look up each pending id individually.
    PendingLookup,
}

/// Either bound ends a loop; at least one must be set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopCondition {
    pub duration: Option<Duration>,
    pub count: Option<u64>,
}

impl StopCondition {
    pub fn reached(&self, elapsed: Duration, count: u64) -> bool {
        self.duration.is_some_and(|duration| elapsed >= duration)
            || self.count.is_some_and(|target| count >= target)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Every account a transfer may be sent to.
    pub addresses: Vec<String>,
    /// Max unconfirmed transfers per node. Unlimited if unset.
    pub inflight_limit: Option<usize>,
    pub duration_secs: Option<u64>,
    /// Transfers each node submits before stopping.
    pub target_count: Option<u64>,
    pub send_interval_ms: u64,
    pub poll_interval_ms: u64,
    /// How long a poller keeps going after its sender stopped.
    pub drain_timeout_secs: u64,
    pub transfer_amount: u64,
    pub gas_limit: u64,
    pub observers: ObserverSelection,
    pub execution: ExecutionMode,
    pub confirmation: ConfirmationStrategy,
    /// Seed for peer selection. Each node derives its own stream from it.
    pub seed: Option<u64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            inflight_limit: None,
            duration_secs: Some(DEFAULT_DURATION_SECS),
            target_count: None,
            send_interval_ms: 0,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            transfer_amount: DEFAULT_TRANSFER_AMOUNT,
            gas_limit: DEFAULT_GAS_LIMIT,
            observers: ObserverSelection::default(),
            execution: ExecutionMode::default(),
            confirmation: ConfirmationStrategy::default(),
            seed: None,
        }
    }
}

impl BenchmarkConfig {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().addresses(addresses)
    }

    pub fn addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn inflight_limit(mut self, limit: usize) -> Self {
        self.inflight_limit = Some(limit);
        self
    }

    /// Runs for `secs` seconds and clears any count target.
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self.target_count = None;
        self
    }

    /// Stops after `count` submissions per node and clears the time budget.
    pub fn target_count(mut self, count: u64) -> Self {
        self.target_count = Some(count);
        self.duration_secs = None;
        self
    }

    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.send_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn drain_timeout_secs(mut self, secs: u64) -> Self {
        self.drain_timeout_secs = secs;
        self
    }

    pub fn observers(mut self, observers: ObserverSelection) -> Self {
        self.observers = observers;
        self
    }

    pub fn execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    pub fn confirmation(mut self, confirmation: ConfirmationStrategy) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn stop_condition(&self) -> StopCondition {
        StopCondition {
            duration: self.duration_secs.map(Duration::from_secs),
            count: self.target_count,
        }
    }

    pub fn send_interval_duration(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Checks the config against a run with `node_count` worker nodes and
    /// returns the validated address set.
    pub fn validate(&self, node_count: usize) -> Result<AddressSet> {
        let addresses = AddressSet::new(&self.addresses)?;
        if node_count == 0 {
            return Err(Error::InvalidConfiguration(
                "at least one account must be driven".to_string(),
            ));
        }
        match (self.duration_secs, self.target_count) {
            (None, None) => {
                return Err(Error::InvalidConfiguration(
                    "either a duration or a target count is required".to_string(),
                ));
            },
            (Some(0), _) => {
                return Err(Error::InvalidConfiguration(
                    "duration must be positive".to_string(),
                ));
            },
            (_, Some(0)) => {
                return Err(Error::InvalidConfiguration(
                    "target count must be positive".to_string(),
                ));
            },
            _ => {},
        }
        if self.inflight_limit == Some(0) {
            return Err(Error::InvalidConfiguration(
                "in-flight limit must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "poll interval must be positive".to_string(),
            ));
        }
        if let ObserverSelection::Single(observer) = self.observers {
            if observer >= node_count {
                return Err(Error::InvalidConfiguration(format!(
                    "observer node {} does not exist, only {} nodes are configured",
                    observer, node_count
                )));
            }
        }
        Ok(addresses)
    }

    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_string = path.as_ref().display().to_string();
        let contents = fs::read_to_string(&path).map_err(|e| Error::ConfigIo(path_string.clone(), e))?;
        serde_yaml::from_str(&contents).map_err(|e| Error::ConfigYaml(path_string, e))
    }

    pub fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_string = path.as_ref().display().to_string();
        let contents =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigYaml(path_string.clone(), e))?;
        fs::write(&path, contents).map_err(|e| Error::ConfigIo(path_string, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_matches, assert_ok};

    fn addresses() -> Vec<&'static str> {
        vec!["0xaa", "0xbb", "0xcc"]
    }

    #[test]
    fn defaults_are_a_thirty_second_run() {
        let config = BenchmarkConfig::new(addresses());
        assert_eq!(config.stop_condition(), StopCondition {
            duration: Some(Duration::from_secs(30)),
            count: None,
        });
        assert_eq!(config.gas_limit, 21_000);
        assert_eq!(assert_ok!(config.validate(2)).len(), 3);
    }

    #[test]
    fn rejects_invalid_configurations() {
        let base = BenchmarkConfig::new(addresses());
        assert_err!(BenchmarkConfig::new(["0xaa"]).validate(1));
        assert_err!(base.clone().validate(0));
        assert_err!(base.clone().target_count(0).validate(1));
        assert_err!(base.clone().duration_secs(0).validate(1));
        assert_err!(base.clone().inflight_limit(0).validate(1));
        assert_err!(base.clone().poll_interval(Duration::ZERO).validate(1));
        assert_err!(
            base.clone()
                .observers(ObserverSelection::Single(2))
                .validate(2)
        );

        let mut no_target = base.clone();
        no_target.duration_secs = None;
        assert_matches!(no_target.validate(1), Err(Error::InvalidConfiguration(_)));
    }

    #[test]
    fn second_setters_store_exact_values() {
        let config = BenchmarkConfig::new(addresses())
            .target_count(5)
            .duration_secs(90)
            .drain_timeout_secs(7);
        assert_eq!(config.target_count, None);
        assert_eq!(config.stop_condition().duration, Some(Duration::from_secs(90)));
        assert_eq!(config.drain_timeout_duration(), Duration::from_secs(7));
    }

    #[test]
    fn stop_condition_either_bound() {
        let both = StopCondition {
            duration: Some(Duration::from_secs(5)),
            count: Some(10),
        };
        assert!(!both.reached(Duration::from_secs(4), 9));
        assert!(both.reached(Duration::from_secs(5), 0));
        assert!(both.reached(Duration::ZERO, 10));
        assert!(!StopCondition::default().reached(Duration::MAX, u64::MAX));
    }

    #[test]
    fn yaml_round_trip_and_unknown_fields() {
        let yaml = r#"
addresses: ["0xaa", "0xbb"]
inflight_limit: 10
target_count: 20
duration_secs: ~
observers:
  single: 1
execution: parallel
confirmation: pending_lookup
"#;
        let config: BenchmarkConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.inflight_limit, Some(10));
        assert_eq!(config.observers, ObserverSelection::Single(1));
        assert_eq!(config.execution, ExecutionMode::Parallel);
        assert_eq!(config.confirmation, ConfirmationStrategy::PendingLookup);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_ok!(config.validate(2));

        assert_err!(serde_yaml::from_str::<BenchmarkConfig>("bogus: 1"));
    }

    #[test]
    fn load_and_save() {
        let path = std::env::temp_dir().join(format!("ledger-bench-config-{}.yaml", std::process::id()));
        let config = BenchmarkConfig::new(addresses()).target_count(5).seed(9);
        assert_ok!(config.save_config(&path));
        assert_eq!(assert_ok!(BenchmarkConfig::load_config(&path)), config);
        let _ = fs::remove_file(&path);

        assert_matches!(
            BenchmarkConfig::load_config("/nonexistent/ledger-bench.yaml"),
            Err(Error::ConfigIo(..))
        );
    }
}
