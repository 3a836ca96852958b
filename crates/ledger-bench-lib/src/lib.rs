// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod args;
pub mod config;
pub mod coordinator;
pub mod counters;
mod error;
pub mod ledger;
pub mod metrics;
pub mod node;
pub mod observer;
pub mod pending;
pub mod poller;
pub mod report;
pub mod selector;
pub mod sender;
pub mod types;
mod wrappers;

// These are the top level things you should need to run a benchmark.
pub use args::WorkloadArgs;
pub use config::{
    BenchmarkConfig, ConfirmationStrategy, ExecutionMode, ObserverSelection, StopCondition,
};
pub use error::{Error, Result};
pub use report::{BenchmarkReport, NodeReport};
pub use wrappers::{generated_addresses, run_benchmark, run_simulated};

// We export these if you want finer grained control.
pub use coordinator::BenchmarkCoordinator;
pub use ledger::{
    LedgerClient, LedgerConnector, LedgerError,
    json_rpc::{EthJsonRpcClient, EthJsonRpcConnector},
    simulated::{SimulatedClient, SimulatedLedger},
};
pub use observer::{ChainObservation, observe_chain};
pub use types::{AccountIdentity, Address, AddressSet, BlockId, LedgerTransaction, Transfer, TxnId};
