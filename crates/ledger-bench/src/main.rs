// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_bench_lib::{
    AccountIdentity, BenchmarkReport, EthJsonRpcConnector, SimulatedLedger, WorkloadArgs,
    counters, ledger::simulated, observe_chain, run_benchmark,
    run_simulated,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[clap(name = "ledger-bench", about = "Transfer throughput and latency benchmark for ledgers")]
struct Args {
    /// Emit logs as JSON lines.
    #[clap(long, global = true)]
    log_json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive real accounts on a JSON-RPC node, recording throughput and
    /// confirmation latency as we go.
    Run(Run),

    /// Same workload against an in-process ledger. Handy for checking a
    /// configuration before pointing it at a real network.
    Simulate(Simulate),

    /// Only watch the chain and report how many transactions it includes,
    /// whoever sent them.
    Observe(Observe),
}

#[derive(Clone, Debug, Parser)]
struct OutputArgs {
    /// Print the report as JSON instead of text.
    #[clap(long)]
    json: bool,

    /// Print the prometheus metrics after the report.
    #[clap(long)]
    dump_metrics: bool,
}

#[derive(Parser, Debug)]
struct Run {
    #[clap(long)]
    endpoint: Url,

    /// Account to drive, as `address` or `address:password`. Repeat for each
    /// account.
    #[clap(long = "account", required = true)]
    accounts: Vec<AccountIdentity>,

    /// How long the node keeps unlocked accounts unlocked.
    #[clap(long, default_value_t = 0)]
    unlock_duration_secs: u64,

    #[clap(long, default_value_t = 10)]
    request_timeout_secs: u64,

    #[clap(flatten)]
    workload: WorkloadArgs,

    #[clap(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct Simulate {
    /// Number of accounts to drive.
    #[clap(long, default_value_t = 4)]
    accounts: usize,

    #[clap(long, default_value_t = 500)]
    block_interval_ms: u64,

    #[clap(long, default_value_t = simulated::DEFAULT_BLOCK_CAPACITY)]
    block_capacity: usize,

    #[clap(flatten)]
    workload: WorkloadArgs,

    #[clap(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct Observe {
    #[clap(long)]
    endpoint: Url,

    #[clap(long, default_value_t = 30)]
    duration_secs: u64,

    #[clap(long, default_value_t = 100)]
    poll_interval_ms: u64,

    #[clap(flatten)]
    output: OutputArgs,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_output<T: Serialize + std::fmt::Display>(value: &T, output: &OutputArgs) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    if output.dump_metrics {
        println!("{}", counters::gather_text());
    }
    Ok(())
}

async fn run(args: Run) -> Result<BenchmarkReport> {
    let mut config = args.workload.to_config()?;
    if config.addresses.is_empty() {
        config.addresses = args
            .accounts
            .iter()
            .map(|account| account.address.clone())
            .collect();
    }
    let connector = EthJsonRpcConnector::new(args.endpoint)
        .unlock_duration_secs(args.unlock_duration_secs)
        .request_timeout(Duration::from_secs(args.request_timeout_secs));
    Ok(run_benchmark(config, Arc::new(connector), &args.accounts).await?)
}

async fn simulate(args: Simulate) -> Result<BenchmarkReport> {
    let config = args.workload.to_config()?;
    let ledger = SimulatedLedger::new(
        Duration::from_millis(args.block_interval_ms),
        args.block_capacity,
    );
    Ok(run_simulated(config, ledger, args.accounts).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    match args.command {
        Command::Run(run_args) => {
            let output = run_args.output.clone();
            let report = run(run_args).await.context("benchmark run failed")?;
            print_output(&report, &output)
        },
        Command::Simulate(simulate_args) => {
            let output = simulate_args.output.clone();
            let report = simulate(simulate_args)
                .await
                .context("simulated run failed")?;
            print_output(&report, &output)
        },
        Command::Observe(observe_args) => {
            let client = EthJsonRpcConnector::new(observe_args.endpoint.clone())
                .read_only_client()
                .await
                .context("cannot reach the ledger")?;
            info!(endpoint = %observe_args.endpoint, "Observing");
            let observation = observe_chain(
                &client,
                Duration::from_secs(observe_args.duration_secs),
                Duration::from_millis(observe_args.poll_interval_ms),
            )
            .await?;
            print_output(&observation, &observe_args.output)
        },
    }
}
