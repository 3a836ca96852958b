// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{ledger::LedgerError, types::TxnId};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invariant violation: transaction {0} is already tracked or was already confirmed")]
    DuplicateKey(TxnId),

    #[error("Node {node} failed to submit transaction with nonce {nonce}: {source}")]
    Submission {
        node: usize,
        nonce: u64,
        #[source]
        source: LedgerError,
    },

    #[error("Node {node} failed to look up {what}: {source}")]
    Lookup {
        node: usize,
        what: String,
        #[source]
        source: LedgerError,
    },

    #[error("Failed to connect account {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: LedgerError,
    },

    #[error("Chain observation failed: {0}")]
    Observation(#[source] LedgerError),

    #[error("Error accessing config {0}: {1}")]
    ConfigIo(String, #[source] std::io::Error),

    #[error("Error (de)serializing config {0}: {1}")]
    ConfigYaml(String, #[source] serde_yaml::Error),

    #[error("Worker node task failed: {0}")]
    NodeTask(String),
}

impl Error {
    /// Returns a summary label for the error
    pub fn get_label(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::Submission { .. } => "submission_error",
            Self::Lookup { .. } => "lookup_error",
            Self::Connect { .. } => "connect_error",
            Self::Observation(_) => "observation_error",
            Self::ConfigIo(..) | Self::ConfigYaml(..) => "config_error",
            Self::NodeTask(_) => "node_task_error",
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Error::NodeTask(error.to_string())
    }
}
