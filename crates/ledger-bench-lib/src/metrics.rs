// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{counters, report::serialize_secs};
use serde::Serialize;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Counters owned by one worker node. The sender bumps `submitted`, the
/// poller bumps everything about confirmations.
///
/// `submitted` is always incremented before the transaction becomes visible
/// to the poller, and [`Metrics::snapshot`] reads `confirmed` first, so a
/// snapshot never shows more confirmations than submissions.
#[derive(Debug, Default)]
pub struct Metrics {
    submitted: AtomicU64,
    confirmed: AtomicU64,
    latency_nanos: AtomicU64,
    max_latency_nanos: AtomicU64,
    skipped: AtomicU64,
    peak_in_flight: AtomicU64,
    blocks: AtomicU64,
    observed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        counters::record_submission();
    }

    pub fn record_confirmed(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_latency_nanos.fetch_max(nanos, Ordering::Relaxed);
        self.confirmed.fetch_add(1, Ordering::SeqCst);
        counters::record_confirmation(latency);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        counters::SUBMISSION_SKIPPED.inc();
    }

    pub fn record_in_flight(&self, in_flight: usize) {
        self.peak_in_flight
            .fetch_max(in_flight as u64, Ordering::Relaxed);
    }

    /// One scanned block carrying `transactions` transactions from anyone.
    pub fn record_block(&self, transactions: usize) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.observed
            .fetch_add(transactions as u64, Ordering::Relaxed);
        counters::BLOCKS_OBSERVED.inc();
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn confirmed(&self) -> u64 {
        self.confirmed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> NodeStats {
        let confirmed = self.confirmed();
        NodeStats {
            confirmed,
            submitted: self.submitted(),
            total_latency: Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed)),
            max_latency: Duration::from_nanos(self.max_latency_nanos.load(Ordering::Relaxed)),
            skipped: self.skipped.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            observed: self.observed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a node's [`Metrics`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub submitted: u64,
    pub confirmed: u64,
    /// Sum over confirmed transfers of (confirmation time - submission time).
    #[serde(serialize_with = "serialize_secs")]
    pub total_latency: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub max_latency: Duration,
    /// Sender iterations that did not submit because of back-pressure.
    pub skipped: u64,
    pub peak_in_flight: u64,
    pub blocks: u64,
    /// Transactions from any sender in the scanned blocks.
    pub observed: u64,
}

impl NodeStats {
    /// `None` until at least one transfer is confirmed.
    pub fn average_latency(&self) -> Option<Duration> {
        if self.confirmed == 0 {
            return None;
        }
        let nanos = self.total_latency.as_nanos() / self.confirmed as u128;
        Some(Duration::from_nanos(nanos as u64))
    }
}
