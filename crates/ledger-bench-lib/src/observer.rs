// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Error, Result},
    ledger::LedgerClient,
    report::serialize_secs,
};
use serde::Serialize;
use std::{fmt, time::Duration};
use tokio::time::Instant;
use tracing::{debug, info};

/// Chain-wide throughput seen by a passive observer, counting every
/// transaction in every new block regardless of who sent it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChainObservation {
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub blocks: u64,
    pub transactions: u64,
    pub largest_block: usize,
}

impl ChainObservation {
    pub fn tps(&self) -> Option<f64> {
        if self.elapsed.is_zero() {
            None
        } else {
            Some(self.transactions as f64 / self.elapsed.as_secs_f64())
        }
    }
}

impl fmt::Display for ChainObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions in {} blocks over {:.3}s",
            self.transactions,
            self.blocks,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(tps) = self.tps() {
            write!(f, " ({:.2} txn/s)", tps)?;
        }
        Ok(())
    }
}

/// Polls for new blocks until `duration` has elapsed.
pub async fn observe_chain(
    client: &dyn LedgerClient,
    duration: Duration,
    poll_interval: Duration,
) -> Result<ChainObservation> {
    let start = Instant::now();
    let mut observation = ChainObservation::default();
    info!(duration_secs = duration.as_secs_f64(), "Observing chain");

    while start.elapsed() < duration {
        let blocks = client.fetch_new_blocks().await.map_err(Error::Observation)?;
        for block in blocks {
            let transactions = match client.fetch_block_transactions(&block).await {
                Ok(transactions) => transactions,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(Error::Observation(e)),
            };
            debug!(block = %block, txns = transactions.len(), "Observed block");
            observation.blocks += 1;
            observation.transactions += transactions.len() as u64;
            observation.largest_block = observation.largest_block.max(transactions.len());
        }
        tokio::time::sleep(poll_interval).await;
    }

    observation.elapsed = start.elapsed();
    info!(%observation, "Observation finished");
    Ok(observation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::simulated::SimulatedLedger,
        types::{AddressSet, Transfer},
    };
    use claims::assert_ok;

    #[tokio::test(start_paused = true)]
    async fn counts_every_sender() {
        let ledger = SimulatedLedger::new(Duration::from_millis(100), 3);
        let observer = ledger.client();
        let sender = ledger.client();
        let addresses = AddressSet::new(["0xa0", "0xa1"]).unwrap();
        for (from, to) in [(0, 1), (1, 0)] {
            for nonce in 0..4 {
                assert_ok!(
                    sender
                        .submit_transfer(&Transfer {
                            from: addresses[from].clone(),
                            to: addresses[to].clone(),
                            amount: 1,
                            gas_limit: 21_000,
                            nonce,
                        })
                        .await
                );
            }
        }

        let observation = assert_ok!(
            observe_chain(&observer, Duration::from_secs(1), Duration::from_millis(50)).await
        );
        assert_eq!(observation.transactions, 8);
        assert_eq!(observation.largest_block, 3);
        assert_eq!(observation.blocks, 9);
        assert_eq!(observation.elapsed, Duration::from_secs(1));
        assert_eq!(observation.tps(), Some(8.0));
    }
}
