use std::collections::HashMap;

use tracing::debug;
use xzc_db::{BestState, Store, Tx};
use xzc_types::{BlockHeader, ChainBlock, Hash, SpentOutput};

use crate::error::{IndexError, IndexResult};
use crate::txindex::fetch_spent_outputs;

/// What the index manager needs to know about the main chain.
pub trait ChainView {
    fn best_block(&self) -> Option<BestState>;

    fn block_hash_by_height(&self, height: u32) -> Option<Hash>;

    fn main_chain_has_block(&self, hash: &Hash) -> bool;

    /// Outputs spent by `block`'s inputs in block order, coinbase excluded.
    fn spent_outputs(&self, tx: &dyn Tx, block: &ChainBlock) -> IndexResult<Vec<SpentOutput>>;
}

/// The main chain as recorded in a [`Store`], found by walking header
/// back-links from the best state.
///
/// Spent outputs are resolved through the transaction index, so that index
/// must be maintained for indexers that need them.
#[derive(Clone, Debug, Default)]
pub struct StoreChain {
    hashes: Vec<Hash>,
    heights: HashMap<Hash, u32>,
}

impl StoreChain {
    pub fn load(store: &Store) -> IndexResult<Self> {
        store.view(|tx| -> IndexResult<Self> {
            let Some(best) = tx.best_state()? else {
                return Ok(Self::default());
            };
            let mut hashes = Vec::with_capacity(best.height as usize + 1);
            let mut hash = best.hash;
            for _ in 0..=best.height {
                hashes.push(hash);
                let header = BlockHeader::decode(&tx.fetch_block_header(&hash)?)?;
                hash = header.prev_block;
            }
            if !hash.is_zero() {
                return Err(IndexError::consistency(
                    "chain",
                    format!("block at height 0 links to {hash}"),
                ));
            }
            hashes.reverse();
            debug!(height = best.height, tip = %best.hash, "loaded main chain");
            Ok(Self::from_hashes(hashes))
        })
    }

    /// A chain whose block at height `i` is `hashes[i]`.
    pub fn from_hashes(hashes: Vec<Hash>) -> Self {
        let heights = hashes
            .iter()
            .enumerate()
            .map(|(height, hash)| (*hash, height as u32))
            .collect();
        Self { hashes, heights }
    }

    pub fn height(&self) -> Option<u32> {
        self.hashes.len().checked_sub(1).map(|h| h as u32)
    }

    pub fn height_of(&self, hash: &Hash) -> Option<u32> {
        self.heights.get(hash).copied()
    }

    pub fn push(&mut self, hash: Hash) {
        self.heights.insert(hash, self.hashes.len() as u32);
        self.hashes.push(hash);
    }

    pub fn pop(&mut self) -> Option<Hash> {
        let hash = self.hashes.pop()?;
        self.heights.remove(&hash);
        Some(hash)
    }
}

impl ChainView for StoreChain {
    fn best_block(&self) -> Option<BestState> {
        let height = self.height()?;
        Some(BestState {
            hash: self.hashes[height as usize],
            height,
        })
    }

    fn block_hash_by_height(&self, height: u32) -> Option<Hash> {
        self.hashes.get(height as usize).copied()
    }

    fn main_chain_has_block(&self, hash: &Hash) -> bool {
        self.heights.contains_key(hash)
    }

    fn spent_outputs(&self, tx: &dyn Tx, block: &ChainBlock) -> IndexResult<Vec<SpentOutput>> {
        fetch_spent_outputs(tx, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_chain, open_store, store_chain};

    #[test]
    fn empty_store_has_no_chain() {
        let (_dir, store) = open_store();
        let chain = StoreChain::load(&store).unwrap();
        assert_eq!(chain.best_block(), None);
        assert_eq!(chain.height(), None);
    }

    #[test]
    fn walks_back_from_best_state() {
        let (_dir, store) = open_store();
        let blocks = build_chain(None, &[1, 2, 3, 4]);
        store_chain(&store, &blocks);

        let chain = StoreChain::load(&store).unwrap();
        assert_eq!(
            chain.best_block(),
            Some(BestState {
                hash: blocks[3].hash(),
                height: 3
            })
        );
        for block in &blocks {
            assert_eq!(chain.block_hash_by_height(block.height()), Some(block.hash()));
            assert!(chain.main_chain_has_block(&block.hash()));
        }
        assert_eq!(chain.block_hash_by_height(4), None);
    }

    #[test]
    fn push_and_pop_track_heights() {
        let blocks = build_chain(None, &[1, 2]);
        let mut chain = StoreChain::from_hashes(vec![blocks[0].hash()]);
        chain.push(blocks[1].hash());
        assert_eq!(chain.height_of(&blocks[1].hash()), Some(1));
        assert_eq!(chain.pop(), Some(blocks[1].hash()));
        assert!(!chain.main_chain_has_block(&blocks[1].hash()));
        assert_eq!(chain.height(), Some(0));
    }
}
