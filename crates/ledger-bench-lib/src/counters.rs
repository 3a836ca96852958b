// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Process-wide prometheus metrics for the harness.
//!
//! Per-node numbers used for the final report live in
//! [`crate::metrics::Metrics`]; these counters aggregate over every node and
//! can be scraped or dumped while a run is in progress.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounter, IntGauge, TextEncoder, exponential_buckets,
    register_histogram, register_int_counter, register_int_gauge,
};
use std::time::Duration;

pub static SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ledger_bench_submitted_total",
        "Total number of transfers accepted by the ledger"
    )
    .unwrap()
});

pub static CONFIRMED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ledger_bench_confirmed_total",
        "Total number of own transfers seen in a block"
    )
    .unwrap()
});

pub static SUBMISSION_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ledger_bench_submission_skipped_total",
        "Sender iterations skipped because the in-flight limit was reached"
    )
    .unwrap()
});

pub static BLOCKS_OBSERVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ledger_bench_blocks_observed_total",
        "Blocks scanned by confirmation pollers"
    )
    .unwrap()
});

pub static PENDING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ledger_bench_pending_transactions",
        "Transfers submitted but not yet confirmed, over all nodes"
    )
    .unwrap()
});

/// Buckets from 50ms to ~51s.
pub static CONFIRMATION_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "ledger_bench_confirmation_latency_seconds",
        "Time from submission to the poller seeing the transfer in a block",
        exponential_buckets(0.05, 2.0, 11).unwrap()
    )
    .unwrap()
});

pub fn record_submission() {
    SUBMITTED.inc();
}

/// A submitted transfer that a poller is now waiting on.
pub fn record_tracked() {
    PENDING.inc();
}

pub fn record_confirmation(latency: Duration) {
    CONFIRMED.inc();
    PENDING.dec();
    CONFIRMATION_LATENCY_SECONDS.observe(latency.as_secs_f64());
}

/// Transfers abandoned when their node stopped without confirming them.
pub fn record_abandoned(count: usize) {
    PENDING.sub(count as i64);
}

/// Renders every registered metric in the text exposition format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        record_submission();
        record_tracked();
        record_confirmation(Duration::from_millis(300));
        SUBMISSION_SKIPPED.inc();
        BLOCKS_OBSERVED.inc_by(2);
        let text = gather_text();
        assert!(text.contains("ledger_bench_submitted_total"));
        assert!(text.contains("ledger_bench_confirmation_latency_seconds_bucket"));
    }
}
