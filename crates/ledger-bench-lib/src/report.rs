// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::metrics::NodeStats;
use serde::{Serialize, Serializer};
use std::{fmt, time::Duration};

pub(crate) fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

pub(crate) fn serialize_opt_secs<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

fn rate(count: u64, elapsed: Duration) -> Option<f64> {
    if elapsed.is_zero() {
        None
    } else {
        Some(count as f64 / elapsed.as_secs_f64())
    }
}

/// What one worker node did during the run.
#[derive(Clone, Debug, Serialize)]
pub struct NodeReport {
    pub index: usize,
    pub address: String,
    /// Whether this node ran a confirmation poller.
    pub observer: bool,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub stats: NodeStats,
    #[serde(serialize_with = "serialize_opt_secs")]
    pub average_latency: Option<Duration>,
}

impl NodeReport {
    pub fn new(index: usize, address: String, observer: bool, elapsed: Duration, stats: NodeStats) -> Self {
        let average_latency = stats.average_latency();
        Self {
            index,
            address,
            observer,
            elapsed,
            stats,
            average_latency,
        }
    }
}

/// Aggregate over every worker node. The run lasts as long as its slowest
/// node, so all rates divide by the maximum elapsed time.
#[derive(Clone, Debug, Serialize)]
pub struct BenchmarkReport {
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub submitted: u64,
    pub confirmed: u64,
    pub skipped: u64,
    pub submitted_tps: Option<f64>,
    pub confirmed_tps: Option<f64>,
    /// Transactions from any sender seen in blocks, by the busiest observer.
    pub observed_tps: Option<f64>,
    #[serde(serialize_with = "serialize_opt_secs")]
    pub average_latency: Option<Duration>,
    #[serde(serialize_with = "serialize_secs")]
    pub max_latency: Duration,
    pub peak_in_flight: u64,
    pub nodes: Vec<NodeReport>,
}

impl BenchmarkReport {
    pub fn from_nodes(mut nodes: Vec<NodeReport>) -> Self {
        nodes.sort_by_key(|node| node.index);
        let elapsed = nodes
            .iter()
            .map(|node| node.elapsed)
            .max()
            .unwrap_or_default();
        let submitted = nodes.iter().map(|node| node.stats.submitted).sum();
        let confirmed = nodes.iter().map(|node| node.stats.confirmed).sum();
        let total_latency: Duration = nodes.iter().map(|node| node.stats.total_latency).sum();
        let average_latency = (confirmed > 0)
            .then(|| Duration::from_nanos((total_latency.as_nanos() / confirmed as u128) as u64));
        let observed = nodes
            .iter()
            .filter(|node| node.observer)
            .map(|node| node.stats.observed)
            .max()
            .unwrap_or(0);
        let any_observer = nodes.iter().any(|node| node.observer);

        Self {
            elapsed,
            submitted,
            confirmed,
            skipped: nodes.iter().map(|node| node.stats.skipped).sum(),
            submitted_tps: rate(submitted, elapsed),
            confirmed_tps: any_observer.then(|| rate(confirmed, elapsed)).flatten(),
            observed_tps: any_observer.then(|| rate(observed, elapsed)).flatten(),
            average_latency,
            max_latency: nodes
                .iter()
                .map(|node| node.stats.max_latency)
                .max()
                .unwrap_or_default(),
            peak_in_flight: nodes
                .iter()
                .map(|node| node.stats.peak_in_flight)
                .max()
                .unwrap_or(0),
            nodes,
        }
    }
}

struct OptRate(Option<f64>);

impl fmt::Display for OptRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(rate) => write!(f, "{:.2} txn/s", rate),
            None => write!(f, "n/a"),
        }
    }
}

struct OptLatency(Option<Duration>);

impl fmt::Display for OptLatency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(latency) => write!(f, "{} ms", latency.as_millis()),
            None => write!(f, "n/a"),
        }
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "elapsed:          {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "submitted:        {} ({})", self.submitted, OptRate(self.submitted_tps))?;
        writeln!(f, "confirmed:        {} ({})", self.confirmed, OptRate(self.confirmed_tps))?;
        writeln!(f, "observed:         {}", OptRate(self.observed_tps))?;
        writeln!(
            f,
            "latency:          avg {}, max {} ms",
            OptLatency(self.average_latency),
            self.max_latency.as_millis()
        )?;
        writeln!(
            f,
            "back-pressure:    {} skipped, peak in flight {}",
            self.skipped, self.peak_in_flight
        )?;
        for node in &self.nodes {
            writeln!(
                f,
                "  node {} {}{}: submitted {}, confirmed {}, avg latency {}, elapsed {:.3}s",
                node.index,
                node.address,
                if node.observer { " (observer)" } else { "" },
                node.stats.submitted,
                node.stats.confirmed,
                OptLatency(node.average_latency),
                node.elapsed.as_secs_f64()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(index: usize, observer: bool, elapsed_ms: u64, submitted: u64, confirmed: u64) -> NodeReport {
        NodeReport::new(
            index,
            format!("0x{:02x}", index),
            observer,
            Duration::from_millis(elapsed_ms),
            NodeStats {
                submitted,
                confirmed,
                total_latency: Duration::from_millis(100 * confirmed),
                max_latency: Duration::from_millis(150),
                observed: 40,
                ..NodeStats::default()
            },
        )
    }

    #[test]
    fn aggregates_over_slowest_node() {
        let report = BenchmarkReport::from_nodes(vec![
            node(1, true, 2_000, 30, 20),
            node(0, true, 1_000, 10, 10),
        ]);
        assert_eq!(report.elapsed, Duration::from_secs(2));
        assert_eq!(report.submitted, 40);
        assert_eq!(report.confirmed, 30);
        assert_eq!(report.confirmed_tps, Some(15.0));
        assert_eq!(report.submitted_tps, Some(20.0));
        assert_eq!(report.observed_tps, Some(20.0));
        assert_eq!(report.average_latency, Some(Duration::from_millis(100)));
        assert_eq!(report.nodes[0].index, 0);
    }

    #[test]
    fn no_observers_means_no_confirmation_rates() {
        let report = BenchmarkReport::from_nodes(vec![node(0, false, 1_000, 10, 0)]);
        assert_eq!(report.confirmed_tps, None);
        assert_eq!(report.observed_tps, None);
        assert_eq!(report.average_latency, None);
        assert!(report.to_string().contains("n/a"));

        let empty = BenchmarkReport::from_nodes(Vec::new());
        assert_eq!(empty.submitted_tps, None);
    }

    #[test]
    fn serializes_durations_as_seconds() {
        let report = BenchmarkReport::from_nodes(vec![node(0, true, 1_500, 3, 2)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 1.5);
        assert_eq!(json["average_latency"], 0.1);
        assert_eq!(json["nodes"][0]["confirmed"], 2);
        assert_eq!(json["nodes"][0]["total_latency"], 0.2);
    }
}
