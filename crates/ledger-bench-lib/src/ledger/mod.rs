// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The boundary between the harness and the ledger it measures.
//!
//! Everything the harness knows about the ledger goes through [`LedgerClient`]:
//! submitting transfers, walking newly appended blocks, and looking up
//! transactions. Wire encoding, key management and account unlocking live
//! behind it. [`LedgerConnector`] hands out one client per worker node.

pub mod json_rpc;
pub mod simulated;

use crate::types::{AccountIdentity, Address, BlockId, LedgerTransaction, Transfer, TxnId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger does not know the id (yet). Expected while polling.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            LedgerError::Decode(error.to_string())
        } else {
            LedgerError::Transport(error.to_string())
        }
    }
}

/// A connection to one ledger endpoint, owned by one worker node.
///
/// The sender and the poller of a node call into the same client
/// concurrently, so every method takes `&self`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits a signed transfer and returns the ledger-assigned id.
    async fn submit_transfer(&self, transfer: &Transfer) -> Result<TxnId, LedgerError>;

    /// Blocks appended since the previous call. The cursor is owned by the
    /// client; a block is never returned twice.
    async fn fetch_new_blocks(&self) -> Result<Vec<BlockId>, LedgerError>;

    async fn fetch_block_transactions(&self, block: &BlockId) -> Result<Vec<TxnId>, LedgerError>;

    /// Fails with [`LedgerError::NotFound`] if the ledger does not know `id`.
    async fn fetch_transaction(&self, id: &TxnId) -> Result<LedgerTransaction, LedgerError>;

    /// The next sequence number the ledger expects from `address`.
    async fn fetch_account_nonce(&self, _address: &Address) -> Result<u64, LedgerError> {
        Ok(0)
    }
}

#[async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Opens a client for `identity`, unlocking its account if needed.
    async fn connect(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Arc<dyn LedgerClient>, LedgerError>;
}
