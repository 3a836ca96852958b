// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! An in-process ledger for dry runs and tests.
//!
//! Accepted transfers queue in a mempool. Blocks are sealed lazily: whenever
//! a client touches the ledger, every block interval that has elapsed since
//! the last seal produces one block of at most `block_capacity` queued
//! transactions. Time comes from [`tokio::time::Instant`], so paused-clock
//! tests see perfectly regular block production.

use crate::{
    ledger::{LedgerClient, LedgerConnector, LedgerError},
    types::{AccountIdentity, Address, BlockId, LedgerTransaction, Transfer, TxnId},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tracing::trace;

pub const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_BLOCK_CAPACITY: usize = 1_000;

#[derive(Debug)]
struct StoredTxn {
    transfer: Transfer,
    block: Option<BlockId>,
}

#[derive(Debug)]
struct SimBlock {
    id: BlockId,
    transactions: Vec<TxnId>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_submissions_from_nonce: Option<u64>,
    transient_submission_failures: u64,
    fail_lookups: bool,
}

#[derive(Debug)]
struct LedgerState {
    last_seal: Instant,
    mempool: VecDeque<TxnId>,
    transactions: HashMap<TxnId, StoredTxn>,
    blocks: Vec<SimBlock>,
    block_index: HashMap<BlockId, usize>,
    next_nonces: HashMap<String, u64>,
    submitted_by: HashMap<String, u64>,
    next_txn_number: u64,
    faults: Faults,
}

impl LedgerState {
    fn seal_due_blocks(&mut self, block_interval: Duration, block_capacity: usize) {
        let now = Instant::now();
        while self.last_seal + block_interval <= now {
            self.last_seal += block_interval;
            let height = self.blocks.len() as u64 + 1;
            let id = BlockId::new(format!("0xb{:063x}", height));
            let take = block_capacity.min(self.mempool.len());
            let transactions: Vec<TxnId> = self.mempool.drain(..take).collect();
            for txn in &transactions {
                if let Some(stored) = self.transactions.get_mut(txn) {
                    stored.block = Some(id.clone());
                }
            }
            trace!(height, txns = transactions.len(), "Sealed simulated block");
            self.block_index.insert(id.clone(), self.blocks.len());
            self.blocks.push(SimBlock { id, transactions });
        }
    }
}

/// Cloning yields another handle to the same ledger.
#[derive(Clone, Debug)]
pub struct SimulatedLedger {
    state: Arc<Mutex<LedgerState>>,
    block_interval: Duration,
    block_capacity: usize,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_INTERVAL, DEFAULT_BLOCK_CAPACITY)
    }
}

impl SimulatedLedger {
    /// `block_interval` must be non-zero.
    pub fn new(block_interval: Duration, block_capacity: usize) -> Self {
        let block_interval = block_interval.max(Duration::from_millis(1));
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                last_seal: Instant::now(),
                mempool: VecDeque::new(),
                transactions: HashMap::new(),
                blocks: Vec::new(),
                block_index: HashMap::new(),
                next_nonces: HashMap::new(),
                submitted_by: HashMap::new(),
                next_txn_number: 1,
                faults: Faults::default(),
            })),
            block_interval,
            block_capacity,
        }
    }

    /// Every submission carrying a nonce at or above `nonce` fails with an
    /// RPC error.
    pub fn fail_submissions_from_nonce(&self, nonce: u64) {
        self.state.lock().faults.fail_submissions_from_nonce = Some(nonce);
    }

    /// The next `count` submissions report the transaction as not yet known.
    pub fn transient_submission_failures(&self, count: u64) {
        self.state.lock().faults.transient_submission_failures = count;
    }

    /// Every transaction lookup fails with an RPC error.
    pub fn fail_lookups(&self) {
        self.state.lock().faults.fail_lookups = true;
    }

    /// Number of transfers the ledger accepted from `address`.
    pub fn submitted_by(&self, address: &str) -> u64 {
        self.state
            .lock()
            .submitted_by
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_submitted(&self) -> u64 {
        self.state.lock().transactions.len() as u64
    }

    pub fn block_count(&self) -> usize {
        let mut state = self.state.lock();
        state.seal_due_blocks(self.block_interval, self.block_capacity);
        state.blocks.len()
    }

    pub fn client(&self) -> SimulatedClient {
        let mut state = self.state.lock();
        state.seal_due_blocks(self.block_interval, self.block_capacity);
        SimulatedClient {
            ledger: self.clone(),
            cursor: Mutex::new(state.blocks.len()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut state = self.state.lock();
        state.seal_due_blocks(self.block_interval, self.block_capacity);
        f(&mut state)
    }
}

#[async_trait]
impl LedgerConnector for SimulatedLedger {
    async fn connect(
        &self,
        _identity: &AccountIdentity,
    ) -> Result<Arc<dyn LedgerClient>, LedgerError> {
        Ok(Arc::new(self.client()))
    }
}

/// One node's view of a [`SimulatedLedger`], with its own block cursor.
#[derive(Debug)]
pub struct SimulatedClient {
    ledger: SimulatedLedger,
    cursor: Mutex<usize>,
}

#[async_trait]
impl LedgerClient for SimulatedClient {
    async fn submit_transfer(&self, transfer: &Transfer) -> Result<TxnId, LedgerError> {
        self.ledger.with_state(|state| {
            if state.faults.transient_submission_failures > 0 {
                state.faults.transient_submission_failures -= 1;
                return Err(LedgerError::NotFound(format!(
                    "transfer {} -> {} nonce {}",
                    transfer.from, transfer.to, transfer.nonce
                )));
            }
            if let Some(from_nonce) = state.faults.fail_submissions_from_nonce {
                if transfer.nonce >= from_nonce {
                    return Err(LedgerError::Rpc {
                        code: -32000,
                        message: "injected submission failure".to_string(),
                    });
                }
            }
            let sender = transfer.from.as_str().to_string();
            let expected = state.next_nonces.get(&sender).copied().unwrap_or(0);
            if transfer.nonce != expected {
                return Err(LedgerError::Rpc {
                    code: -32000,
                    message: format!("invalid nonce {}, expected {}", transfer.nonce, expected),
                });
            }
            state.next_nonces.insert(sender.clone(), expected + 1);
            *state.submitted_by.entry(sender).or_insert(0) += 1;

            let id = TxnId::new(format!("0x{:064x}", state.next_txn_number));
            state.next_txn_number += 1;
            state.mempool.push_back(id.clone());
            state.transactions.insert(id.clone(), StoredTxn {
                transfer: transfer.clone(),
                block: None,
            });
            Ok(id)
        })
    }

    async fn fetch_new_blocks(&self) -> Result<Vec<BlockId>, LedgerError> {
        self.ledger.with_state(|state| {
            let mut cursor = self.cursor.lock();
            let new_blocks = state.blocks[*cursor..]
                .iter()
                .map(|block| block.id.clone())
                .collect();
            *cursor = state.blocks.len();
            Ok(new_blocks)
        })
    }

    async fn fetch_block_transactions(&self, block: &BlockId) -> Result<Vec<TxnId>, LedgerError> {
        self.ledger.with_state(|state| {
            state
                .block_index
                .get(block)
                .map(|index| state.blocks[*index].transactions.clone())
                .ok_or_else(|| LedgerError::NotFound(block.to_string()))
        })
    }

    async fn fetch_transaction(&self, id: &TxnId) -> Result<LedgerTransaction, LedgerError> {
        self.ledger.with_state(|state| {
            if state.faults.fail_lookups {
                return Err(LedgerError::Rpc {
                    code: -32603,
                    message: "injected lookup failure".to_string(),
                });
            }
            let stored = state
                .transactions
                .get(id)
                .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
            Ok(LedgerTransaction {
                id: id.clone(),
                from: stored.transfer.from.to_string(),
                to: Some(stored.transfer.to.to_string()),
                amount: stored.transfer.amount as u128,
                nonce: stored.transfer.nonce,
                block: stored.block.clone(),
            })
        })
    }

    async fn fetch_account_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        self.ledger.with_state(|state| {
            Ok(state
                .next_nonces
                .get(address.as_str())
                .copied()
                .unwrap_or(0))
        })
    }
}
