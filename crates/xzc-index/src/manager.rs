use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};
use xzc_db::{Store, Tx, WriteTx};
use xzc_types::{ChainBlock, SpentOutput};

use crate::addrindex::AddrIndex;
use crate::chain::ChainView;
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::indexer::{
    index_tip, is_created, register_tip, remove_index, write_tip, IndexTip, Indexer,
};
use crate::txindex::TxIndex;

/// What [`IndexManager::init`] had to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Indexes created because they did not exist yet.
    pub created: Vec<String>,
    /// Orphaned blocks rolled back, counted once per indexer.
    pub disconnected: u64,
    /// Main-chain blocks replayed into at least one lagging indexer.
    pub connected: u64,
}

/// Drives a fixed, ordered set of indexers.
///
/// Blocks are connected in registration order and disconnected in reverse,
/// so an indexer may rely on the ones registered before it having already
/// seen the block.
pub struct IndexManager {
    indexers: Vec<Box<dyn Indexer>>,
    catch_up_batch_size: u32,
    max_reorg_depth: u32,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager {
    pub fn new() -> Self {
        let defaults = IndexConfig::default();
        Self {
            indexers: Vec::new(),
            catch_up_batch_size: defaults.catch_up_batch_size,
            max_reorg_depth: defaults.max_reorg_depth,
        }
    }

    /// A manager with the indexes `config` enables.
    pub fn from_config(config: &IndexConfig) -> IndexResult<Self> {
        let mut manager = Self::new()
            .with_catch_up_batch_size(config.catch_up_batch_size)
            .with_max_reorg_depth(config.max_reorg_depth);
        if config.tx_index || config.addr_index {
            manager.register(Box::new(TxIndex::new()))?;
        }
        if config.addr_index {
            manager.register(Box::new(AddrIndex::new()))?;
        }
        Ok(manager)
    }

    pub fn with_catch_up_batch_size(mut self, blocks: u32) -> Self {
        self.catch_up_batch_size = blocks.max(1);
        self
    }

    pub fn with_max_reorg_depth(mut self, blocks: u32) -> Self {
        self.max_reorg_depth = blocks;
        self
    }

    /// Add an indexer after those already registered.
    pub fn register(&mut self, indexer: Box<dyn Indexer>) -> IndexResult<()> {
        let name = indexer.name();
        if self.indexer(name).is_some() {
            return Err(IndexError::DuplicateIndexer(name.to_string()));
        }
        if let Some(missing) = indexer
            .dependencies()
            .iter()
            .find(|dep| self.indexer(dep).is_none())
        {
            return Err(IndexError::MissingDependency {
                indexer: name.to_string(),
                dependency: missing.to_string(),
            });
        }
        debug!(indexer = name, position = self.indexers.len(), "registered indexer");
        self.indexers.push(indexer);
        Ok(())
    }

    pub fn indexer(&self, name: &str) -> Option<&dyn Indexer> {
        self.indexers
            .iter()
            .find(|indexer| indexer.name() == name)
            .map(|indexer| &**indexer)
    }

    /// Registered indexer names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.indexers.iter().map(|indexer| indexer.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }

    /// Whether the chain engine has to supply spent outputs at all.
    pub fn needs_spent_outputs(&self) -> bool {
        self.indexers.iter().any(|indexer| indexer.needs_spent_outputs())
    }

    /// Create every registered index that does not exist yet.
    pub fn create_indexes(&self, store: &Store) -> IndexResult<Vec<String>> {
        store.update(|tx| -> IndexResult<Vec<String>> {
            let mut created = Vec::new();
            for indexer in &self.indexers {
                let name = indexer.name();
                if is_created(&*tx, name)? {
                    continue;
                }
                register_tip(tx, name)?;
                indexer.create(tx)?;
                info!(indexer = name, "created index");
                created.push(name.to_string());
            }
            Ok(created)
        })
    }

    /// Bring every index in line with `chain`.
    ///
    /// 1. Create missing indexes.
    /// 2. Roll each index back off any orphaned branch, last registered
    ///    first.
    /// 3. Replay main-chain blocks from the lowest index tip, in write
    ///    transactions of at most the catch-up batch size.
    ///
    /// `interrupt` is checked between transactions; a crash or interrupt
    /// resumes from the last committed batch. Running `init` again without a
    /// chain change does nothing.
    pub fn init<C>(&self, store: &Store, chain: &C, interrupt: &AtomicBool) -> IndexResult<InitReport>
    where
        C: ChainView + ?Sized,
    {
        let mut report = InitReport {
            created: self.create_indexes(store)?,
            ..InitReport::default()
        };
        for indexer in self.indexers.iter().rev() {
            report.disconnected += self.roll_back_orphans(store, chain, &**indexer, interrupt)?;
        }
        report.connected = self.catch_up(store, chain, interrupt)?;

        if report.connected > 0 || report.disconnected > 0 {
            info!(
                connected = report.connected,
                disconnected = report.disconnected,
                "indexes caught up"
            );
        }
        Ok(report)
    }

    fn roll_back_orphans<C>(
        &self,
        store: &Store,
        chain: &C,
        indexer: &dyn Indexer,
        interrupt: &AtomicBool,
    ) -> IndexResult<u64>
    where
        C: ChainView + ?Sized,
    {
        let name = indexer.name();
        let mut rolled_back = 0u64;
        loop {
            let finished = store.update(|tx| -> IndexResult<bool> {
                for _ in 0..self.catch_up_batch_size {
                    let Some(tip) = index_tip(&*tx, name)? else {
                        return Ok(true);
                    };
                    if chain.main_chain_has_block(&tip.hash) {
                        return Ok(true);
                    }
                    if rolled_back >= u64::from(self.max_reorg_depth) {
                        return Err(IndexError::consistency(
                            name,
                            format!(
                                "no main-chain ancestor within {} blocks of the tip",
                                self.max_reorg_depth
                            ),
                        ));
                    }
                    let bytes = tx.fetch_block(&tip.hash).map_err(|e| {
                        if e.is_not_found() {
                            IndexError::consistency(
                                name,
                                format!("orphaned tip {} is not in the block store", tip.hash),
                            )
                        } else {
                            e.into()
                        }
                    })?;
                    let block = ChainBlock::from_bytes(&bytes, tip.height)?;
                    let spent = if indexer.needs_spent_outputs() {
                        chain.spent_outputs(&*tx, &block)?
                    } else {
                        Vec::new()
                    };
                    indexer.disconnect_block(tx, &block, &spent)?;
                    write_tip(tx, name, IndexTip::before(&block))?;
                    rolled_back += 1;
                    debug!(indexer = name, hash = %tip.hash, height = tip.height, "rolled back orphaned block");
                }
                Ok(false)
            })?;
            if finished {
                break;
            }
            if interrupt.load(Ordering::Relaxed) {
                return Err(IndexError::Interrupted);
            }
        }
        if rolled_back > 0 {
            warn!(indexer = name, blocks = rolled_back, "rolled index back off an orphaned branch");
        }
        Ok(rolled_back)
    }

    fn catch_up<C>(&self, store: &Store, chain: &C, interrupt: &AtomicBool) -> IndexResult<u64>
    where
        C: ChainView + ?Sized,
    {
        let Some(best) = chain.best_block() else {
            return Ok(0);
        };
        let mut next = store.view(|tx| -> IndexResult<u32> {
            let mut lowest = best.height.saturating_add(1);
            for indexer in &self.indexers {
                let next = index_tip(tx, indexer.name())?.map_or(0, |tip| tip.height + 1);
                lowest = lowest.min(next);
            }
            Ok(lowest)
        })?;
        if next > best.height {
            return Ok(0);
        }

        info!(from = next, to = best.height, "catching up indexes");
        let mut connected = 0u64;
        loop {
            let end = best
                .height
                .min(next.saturating_add(self.catch_up_batch_size - 1));
            connected += store.update(|tx| -> IndexResult<u64> {
                let mut count = 0;
                for height in next..=end {
                    if self.connect_lagging(tx, chain, height)? {
                        count += 1;
                    }
                }
                Ok(count)
            })?;
            debug!(height = end, "index catch-up batch committed");

            if end >= best.height {
                return Ok(connected);
            }
            if interrupt.load(Ordering::Relaxed) {
                warn!(height = end, "index catch-up interrupted");
                return Err(IndexError::Interrupted);
            }
            next = end + 1;
        }
    }

    /// Connect the main-chain block at `height` to every indexer that has
    /// not seen it yet. Returns whether any had to.
    fn connect_lagging<C>(&self, tx: &mut WriteTx<'_>, chain: &C, height: u32) -> IndexResult<bool>
    where
        C: ChainView + ?Sized,
    {
        let hash = chain
            .block_hash_by_height(height)
            .ok_or(IndexError::ChainHeight(height))?;
        let bytes = tx.fetch_block(&hash)?;
        let block = ChainBlock::from_bytes(&bytes, height)?;

        let mut spent: Option<Vec<SpentOutput>> = None;
        let mut any = false;
        for indexer in &self.indexers {
            let name = indexer.name();
            let tip = index_tip(&*tx, name)?;
            if tip.is_some_and(|tip| tip.height >= height) {
                continue;
            }
            if !IndexTip::is_extended_by(tip, &block) {
                return Err(tip_mismatch(name, &block));
            }
            if indexer.needs_spent_outputs() && spent.is_none() {
                spent = Some(chain.spent_outputs(&*tx, &block)?);
            }
            indexer.connect_block(tx, &block, spent.as_deref().unwrap_or(&[]))?;
            write_tip(tx, name, Some(IndexTip::of(&block)))?;
            any = true;
        }
        Ok(any)
    }

    /// Fold a newly connected main-chain block into every index.
    ///
    /// Runs inside the chain engine's write transaction; every indexer's tip
    /// must be `block`'s parent.
    pub fn connect_block(
        &self,
        tx: &mut WriteTx<'_>,
        block: &ChainBlock,
        spent: &[SpentOutput],
    ) -> IndexResult<()> {
        for indexer in &self.indexers {
            let name = indexer.name();
            if !IndexTip::is_extended_by(index_tip(&*tx, name)?, block) {
                return Err(tip_mismatch(name, block));
            }
            indexer.connect_block(tx, block, spent)?;
            write_tip(tx, name, Some(IndexTip::of(block)))?;
        }
        Ok(())
    }

    /// Undo [`connect_block`](Self::connect_block) for the tip `block`, last
    /// registered indexer first.
    pub fn disconnect_block(
        &self,
        tx: &mut WriteTx<'_>,
        block: &ChainBlock,
        spent: &[SpentOutput],
    ) -> IndexResult<()> {
        for indexer in self.indexers.iter().rev() {
            let name = indexer.name();
            if index_tip(&*tx, name)? != Some(IndexTip::of(block)) {
                return Err(tip_mismatch(name, block));
            }
            indexer.disconnect_block(tx, block, spent)?;
            write_tip(tx, name, IndexTip::before(block))?;
        }
        Ok(())
    }

    /// Delete index `name` and every registered index that depends on it.
    /// They are rebuilt from the genesis block by the next [`init`](Self::init).
    pub fn drop_index(&self, store: &Store, name: &str) -> IndexResult<Vec<String>> {
        let mut doomed = vec![name.to_string()];
        for indexer in &self.indexers {
            let depends = indexer
                .dependencies()
                .iter()
                .any(|dep| doomed.iter().any(|d| d == dep));
            if depends && !doomed.iter().any(|d| d == indexer.name()) {
                doomed.push(indexer.name().to_string());
            }
        }

        let dropped = store.update(|tx| -> IndexResult<Vec<String>> {
            if !remove_index(tx, name)? {
                return Err(IndexError::UnknownIndexer(name.to_string()));
            }
            let mut dropped = vec![name.to_string()];
            for dependant in &doomed[1..] {
                if remove_index(tx, dependant)? {
                    dropped.push(dependant.clone());
                }
            }
            Ok(dropped)
        })?;
        info!(dropped = ?dropped, "dropped indexes");
        Ok(dropped)
    }
}

fn tip_mismatch(indexer: &str, block: &ChainBlock) -> IndexError {
    IndexError::TipMismatch {
        indexer: indexer.to_string(),
        block: block.hash(),
        height: block.height(),
    }
}

#[cfg(test)]
mod tests {
    use xzc_types::Hash;

    use super::*;
    use crate::addrindex::ADDR_INDEX_NAME;
    use crate::chain::StoreChain;
    use crate::test_support::{build_chain, connect, disconnect, dump, open_store, store_chain};
    use crate::txindex::TX_INDEX_NAME;

    fn full_manager() -> IndexManager {
        let mut manager = IndexManager::new();
        manager.register(Box::new(TxIndex::new())).unwrap();
        manager.register(Box::new(AddrIndex::new())).unwrap();
        manager
    }

    fn tx_only() -> IndexManager {
        let mut manager = IndexManager::new();
        manager.register(Box::new(TxIndex::new())).unwrap();
        manager
    }

    fn live(store: &Store, manager: &IndexManager, blocks: &[ChainBlock]) {
        manager.create_indexes(store).unwrap();
        for block in blocks {
            connect(store, manager, block).unwrap();
        }
    }

    fn init(store: &Store, manager: &IndexManager) -> IndexResult<InitReport> {
        let chain = StoreChain::load(store)?;
        manager.init(store, &chain, &AtomicBool::new(false))
    }

    fn tip_of(store: &Store, name: &str) -> Option<IndexTip> {
        store.view(|tx| index_tip(tx, name)).unwrap()
    }

    fn tags(range: std::ops::RangeInclusive<u8>) -> Vec<u8> {
        range.collect()
    }

    #[test]
    fn registration_order_and_dependencies() {
        let mut manager = IndexManager::new();
        assert!(matches!(
            manager.register(Box::new(AddrIndex::new())),
            Err(IndexError::MissingDependency { ref dependency, .. }) if dependency == TX_INDEX_NAME
        ));
        manager.register(Box::new(TxIndex::new())).unwrap();
        assert!(matches!(
            manager.register(Box::new(TxIndex::new())),
            Err(IndexError::DuplicateIndexer(_))
        ));
        manager.register(Box::new(AddrIndex::new())).unwrap();
        assert_eq!(manager.names(), vec![TX_INDEX_NAME, ADDR_INDEX_NAME]);
        assert!(manager.needs_spent_outputs());
    }

    #[test]
    fn config_selects_indexes() {
        assert!(IndexManager::from_config(&IndexConfig::default()).unwrap().is_empty());

        let config = IndexConfig {
            addr_index: true,
            ..IndexConfig::default()
        };
        let manager = IndexManager::from_config(&config).unwrap();
        assert_eq!(manager.names(), vec![TX_INDEX_NAME, ADDR_INDEX_NAME]);
        assert!(!tx_only().needs_spent_outputs());
    }

    #[test]
    fn reorg_leaves_no_residue() {
        let a = build_chain(None, &tags(1..=10));
        let b = build_chain(Some(&a[4]), &tags(56..=60));

        let (_d1, reorged) = open_store();
        let manager = full_manager();
        live(&reorged, &manager, &a);
        for block in a[5..].iter().rev() {
            disconnect(&reorged, &manager, block).unwrap();
        }
        for block in &b {
            connect(&reorged, &manager, block).unwrap();
        }

        let (_d2, direct) = open_store();
        live(&direct, &manager, &a[..5]);
        for block in &b {
            connect(&direct, &manager, block).unwrap();
        }

        let contents = dump(&reorged);
        assert!(!contents.is_empty());
        assert_eq!(contents, dump(&direct));
    }

    #[test]
    fn catch_up_matches_live_indexing() {
        let blocks = build_chain(None, &tags(1..=10));

        let (_d1, caught_up) = open_store();
        store_chain(&caught_up, &blocks);
        let manager = full_manager().with_catch_up_batch_size(3);
        let report = init(&caught_up, &manager).unwrap();
        assert_eq!(report.created, vec![TX_INDEX_NAME.to_string(), ADDR_INDEX_NAME.to_string()]);
        assert_eq!(report.connected, 10);
        assert_eq!(report.disconnected, 0);

        let (_d2, indexed) = open_store();
        live(&indexed, &manager, &blocks);
        assert_eq!(dump(&caught_up), dump(&indexed));
    }

    #[test]
    fn init_is_idempotent() {
        let (_dir, store) = open_store();
        store_chain(&store, &build_chain(None, &tags(1..=6)));
        let manager = full_manager();
        init(&store, &manager).unwrap();
        let before = dump(&store);

        assert_eq!(init(&store, &manager).unwrap(), InitReport::default());
        assert_eq!(dump(&store), before);
    }

    #[test]
    fn init_without_a_chain_only_creates() {
        let (_dir, store) = open_store();
        let report = init(&store, &full_manager()).unwrap();
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.connected, 0);
        assert_eq!(tip_of(&store, TX_INDEX_NAME), None);
    }

    #[test]
    fn interrupted_catch_up_resumes_from_last_batch() {
        let (_dir, store) = open_store();
        let blocks = build_chain(None, &tags(1..=10));
        store_chain(&store, &blocks);
        let manager = full_manager().with_catch_up_batch_size(4);
        let chain = StoreChain::load(&store).unwrap();

        let err = manager.init(&store, &chain, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, IndexError::Interrupted));
        assert_eq!(tip_of(&store, TX_INDEX_NAME), Some(IndexTip::of(&blocks[3])));
        assert_eq!(tip_of(&store, ADDR_INDEX_NAME), Some(IndexTip::of(&blocks[3])));

        let report = manager.init(&store, &chain, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.connected, 6);
        assert_eq!(tip_of(&store, ADDR_INDEX_NAME), Some(IndexTip::of(&blocks[9])));
    }

    #[test]
    fn init_rolls_back_orphaned_branch() {
        let a = build_chain(None, &tags(1..=8));
        let b = build_chain(Some(&a[4]), &tags(60..=64));
        let manager = full_manager();

        let (_d1, store) = open_store();
        live(&store, &manager, &a);
        // The chain engine reorganized onto `b` while indexing was off.
        store_chain(&store, &b);

        let report = init(&store, &manager).unwrap();
        assert_eq!(report.disconnected, 6);
        assert_eq!(report.connected, 5);
        assert_eq!(tip_of(&store, TX_INDEX_NAME), Some(IndexTip::of(&b[4])));

        let (_d2, direct) = open_store();
        live(&direct, &manager, &a[..5]);
        for block in &b {
            connect(&direct, &manager, block).unwrap();
        }
        assert_eq!(dump(&store), dump(&direct));
    }

    #[test]
    fn deep_orphan_is_a_consistency_error() {
        let a = build_chain(None, &tags(1..=8));
        let b = build_chain(Some(&a[4]), &tags(60..=64));
        let manager = full_manager().with_max_reorg_depth(2);

        let (_dir, store) = open_store();
        live(&store, &manager, &a);
        store_chain(&store, &b);

        let err = init(&store, &manager).unwrap_err();
        assert!(matches!(err, IndexError::Consistency { ref indexer, .. } if indexer == ADDR_INDEX_NAME));
        assert!(err.needs_reindex());
        // Nothing was rolled back.
        assert_eq!(tip_of(&store, ADDR_INDEX_NAME), Some(IndexTip::of(&a[7])));
    }

    #[test]
    fn unknown_tip_is_a_consistency_error() {
        let (_dir, store) = open_store();
        let manager = tx_only();
        live(&store, &manager, &build_chain(None, &tags(1..=3)));
        store
            .update(|tx| {
                write_tip(
                    tx,
                    TX_INDEX_NAME,
                    Some(IndexTip {
                        hash: Hash::double_sha256(b"ghost"),
                        height: 2,
                    }),
                )
            })
            .unwrap();

        assert!(matches!(init(&store, &manager), Err(IndexError::Consistency { .. })));
    }

    #[test]
    fn live_updates_must_follow_the_tip() {
        let (_dir, store) = open_store();
        let manager = tx_only();
        let blocks = build_chain(None, &tags(1..=3));
        live(&store, &manager, &blocks[..1]);

        let err = connect(&store, &manager, &blocks[2]).unwrap_err();
        assert!(matches!(err, IndexError::TipMismatch { height: 2, .. }));

        connect(&store, &manager, &blocks[1]).unwrap();
        let err = disconnect(&store, &manager, &blocks[0]).unwrap_err();
        assert!(matches!(err, IndexError::TipMismatch { height: 0, .. }));
        assert_eq!(tip_of(&store, TX_INDEX_NAME), Some(IndexTip::of(&blocks[1])));
    }

    #[test]
    fn dropping_an_index_takes_its_dependants_along() {
        let (_dir, store) = open_store();
        let manager = full_manager();
        live(&store, &manager, &build_chain(None, &tags(1..=3)));
        let before = dump(&store);

        let dropped = manager.drop_index(&store, TX_INDEX_NAME).unwrap();
        assert_eq!(dropped, vec![TX_INDEX_NAME.to_string(), ADDR_INDEX_NAME.to_string()]);
        assert!(dump(&store).is_empty());
        assert!(!store.view(|tx| is_created(tx, ADDR_INDEX_NAME)).unwrap());
        assert!(matches!(
            manager.drop_index(&store, TX_INDEX_NAME),
            Err(IndexError::UnknownIndexer(_))
        ));

        let report = init(&store, &manager).unwrap();
        assert_eq!(report.created.len(), 2);
        assert_eq!(report.connected, 3);
        assert_eq!(dump(&store), before);
    }
}
