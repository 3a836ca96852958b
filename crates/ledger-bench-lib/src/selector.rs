// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use rand::{
    Rng, SeedableRng,
    rngs::{OsRng, StdRng},
};

/// Picks transfer counterparties uniformly among every address except the
/// sender's own.
#[derive(Debug)]
pub struct PeerSelector {
    rng: StdRng,
}

impl PeerSelector {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Result<Self> {
        StdRng::from_rng(OsRng)
            .map(Self::new)
            .map_err(|e| Error::InvalidConfiguration(format!("cannot seed peer selector: {}", e)))
    }

    pub fn choose(&mut self, self_index: usize, address_count: usize) -> Result<usize> {
        choose_peer(&mut self.rng, self_index, address_count)
    }
}

/// Draws from `[0, address_count - 2]` and shifts draws at or past
/// `self_index` up by one, which maps the draw uniformly onto the other
/// `address_count - 1` indices.
pub fn choose_peer<R: Rng + ?Sized>(
    rng: &mut R,
    self_index: usize,
    address_count: usize,
) -> Result<usize> {
    if address_count < 2 {
        return Err(Error::InvalidConfiguration(format!(
            "peer selection needs at least 2 addresses, got {}",
            address_count
        )));
    }
    if self_index >= address_count {
        return Err(Error::InvalidConfiguration(format!(
            "own index {} is outside an address set of {}",
            self_index, address_count
        )));
    }
    let mut peer = rng.gen_range(0, address_count - 1);
    if peer >= self_index {
        peer += 1;
    }
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok_eq};
    use proptest::prelude::*;

    #[test]
    fn two_addresses_always_pick_the_other() {
        let mut selector = PeerSelector::from_seed(7);
        for _ in 0..1_000 {
            assert_ok_eq!(selector.choose(0, 2), 1);
            assert_ok_eq!(selector.choose(1, 2), 0);
        }
    }

    #[test]
    fn rejects_degenerate_sets() {
        let mut selector = PeerSelector::from_seed(7);
        assert_err!(selector.choose(0, 1));
        assert_err!(selector.choose(0, 0));
        assert_err!(selector.choose(5, 5));
    }

    #[test]
    fn distribution_is_uniform_over_peers() {
        const COUNT: usize = 8;
        const DRAWS: usize = 70_000;
        let mut selector = PeerSelector::from_seed(42);
        for self_index in [0, 3, COUNT - 1] {
            let mut hits = [0usize; COUNT];
            for _ in 0..DRAWS {
                hits[selector.choose(self_index, COUNT).unwrap()] += 1;
            }
            assert_eq!(hits[self_index], 0);
            let expected = DRAWS as f64 / (COUNT - 1) as f64;
            for (index, count) in hits.iter().enumerate() {
                if index == self_index {
                    continue;
                }
                // 10_000 expected per bucket; 5% is far outside sampling noise.
                let deviation = (*count as f64 - expected).abs() / expected;
                assert!(
                    deviation < 0.05,
                    "index {} drawn {} times, expected ~{}",
                    index,
                    count,
                    expected
                );
            }
        }
    }

    proptest! {
        #[test]
        fn never_picks_self(seed in any::<u64>(), count in 2usize..64, offset in any::<usize>()) {
            let self_index = offset % count;
            let mut selector = PeerSelector::from_seed(seed);
            for _ in 0..32 {
                let peer = selector.choose(self_index, count).unwrap();
                prop_assert!(peer < count);
                prop_assert_ne!(peer, self_index);
            }
        }
    }
}
