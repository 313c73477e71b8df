//! Transactions by hash.
//!
//! ```text
//! txbyhashidx/
//!   idbyhash/   block hash -> block id (u32 BE)
//!   hashbyid/   block id (u32 BE) -> block hash
//!   txs/        txid -> block id || offset || len (u32 LE each)
//!   shadowed/   block id (u32 BE) || txid -> entry the block's txid replaced
//! ```
//!
//! Every indexed block gets a compact id, the next after the highest in use,
//! so a transaction entry is 12 bytes rather than carrying the full block
//! hash. Ids are released again when their block is disconnected.
//!
//! A txid can repeat on the main chain (identical coinbases before BIP30).
//! The newest occurrence wins, and the entry it replaced is kept under
//! `shadowed/` until that block is disconnected again.

use std::collections::HashMap;

use tracing::debug;
use xzc_db::{BlockRegion, Tx, WriteTx};
use xzc_types::{ChainBlock, Hash, SpentOutput, Transaction};

use crate::error::{IndexError, IndexResult};
use crate::indexer::{index_bucket, indexes_bucket, nested, Indexer};

pub const TX_INDEX_NAME: &str = "txbyhashidx";

const ID_BY_HASH: &[u8] = b"idbyhash";
const HASH_BY_ID: &[u8] = b"hashbyid";
const TXS: &[u8] = b"txs";
const SHADOWED: &[u8] = b"shadowed";

fn shadow_key(block_id: u32, txid: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + 32);
    key.extend_from_slice(&block_id.to_be_bytes());
    key.extend_from_slice(txid.as_bytes());
    key
}

/// Where a transaction sits: the block's compact id and the byte range inside
/// the serialized block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TxEntry {
    pub block_id: u32,
    pub offset: u32,
    pub len: u32,
}

impl TxEntry {
    pub const ENCODED_LEN: usize = 12;

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.block_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn decode(indexer: &str, bytes: &[u8]) -> IndexResult<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(IndexError::corrupt(
                indexer,
                format!("entry of {} bytes", bytes.len()),
            ));
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Ok(Self {
            block_id: word(0),
            offset: word(4),
            len: word(8),
        })
    }
}

fn decode_id(bytes: &[u8]) -> IndexResult<u32> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| IndexError::corrupt(TX_INDEX_NAME, format!("block id of {} bytes", bytes.len())))?;
    Ok(u32::from_be_bytes(raw))
}

/// Maps every main-chain transaction id to its location.
#[derive(Clone, Copy, Debug, Default)]
pub struct TxIndex;

impl TxIndex {
    pub fn new() -> Self {
        Self
    }

    pub fn block_id_by_hash<T: Tx + ?Sized>(tx: &T, hash: &Hash) -> IndexResult<Option<u32>> {
        let root = index_bucket(tx, TX_INDEX_NAME)?;
        nested(&root, TX_INDEX_NAME, ID_BY_HASH)?
            .get(hash.as_bytes())?
            .map(|raw| decode_id(&raw))
            .transpose()
    }

    pub fn block_hash_by_id<T: Tx + ?Sized>(tx: &T, id: u32) -> IndexResult<Option<Hash>> {
        let root = index_bucket(tx, TX_INDEX_NAME)?;
        match nested(&root, TX_INDEX_NAME, HASH_BY_ID)?.get(&id.to_be_bytes())? {
            Some(raw) => Ok(Some(Hash::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn entry<T: Tx + ?Sized>(tx: &T, txid: &Hash) -> IndexResult<Option<TxEntry>> {
        let root = index_bucket(tx, TX_INDEX_NAME)?;
        nested(&root, TX_INDEX_NAME, TXS)?
            .get(txid.as_bytes())?
            .map(|raw| TxEntry::decode(TX_INDEX_NAME, &raw))
            .transpose()
    }

    /// Turn an entry into a region of its block.
    pub(crate) fn resolve<T: Tx + ?Sized>(tx: &T, entry: TxEntry) -> IndexResult<BlockRegion> {
        let hash = Self::block_hash_by_id(tx, entry.block_id)?.ok_or_else(|| {
            IndexError::corrupt(TX_INDEX_NAME, format!("unknown block id {}", entry.block_id))
        })?;
        Ok(BlockRegion {
            hash,
            offset: entry.offset,
            len: entry.len,
        })
    }

    /// Location of transaction `txid` on the main chain.
    pub fn tx_region<T: Tx + ?Sized>(tx: &T, txid: &Hash) -> IndexResult<Option<BlockRegion>> {
        match Self::entry(tx, txid)? {
            Some(entry) => Ok(Some(Self::resolve(tx, entry)?)),
            None => Ok(None),
        }
    }

    /// Read and decode transaction `txid` straight from its block's bytes.
    pub fn fetch_transaction<T: Tx + ?Sized>(tx: &T, txid: &Hash) -> IndexResult<Option<Transaction>> {
        match Self::tx_region(tx, txid)? {
            Some(region) => {
                let bytes = tx.fetch_block_region(&region)?;
                Ok(Some(Transaction::decode(&bytes)?))
            }
            None => Ok(None),
        }
    }
}

impl Indexer for TxIndex {
    fn name(&self) -> &'static str {
        TX_INDEX_NAME
    }

    fn needs_spent_outputs(&self) -> bool {
        false
    }

    fn create(&self, tx: &WriteTx<'_>) -> IndexResult<()> {
        let root = indexes_bucket(tx)?
            .ok_or_else(|| IndexError::NotInitialized(TX_INDEX_NAME.to_string()))?
            .create_bucket_if_not_exists(TX_INDEX_NAME.as_bytes())?;
        for name in [ID_BY_HASH, HASH_BY_ID, TXS, SHADOWED] {
            root.create_bucket_if_not_exists(name)?;
        }
        Ok(())
    }

    fn connect_block(&self, tx: &WriteTx<'_>, block: &ChainBlock, _spent: &[SpentOutput]) -> IndexResult<()> {
        let root = index_bucket(tx, TX_INDEX_NAME)?;
        let id_by_hash = nested(&root, TX_INDEX_NAME, ID_BY_HASH)?;
        let hash_by_id = nested(&root, TX_INDEX_NAME, HASH_BY_ID)?;
        let txs = nested(&root, TX_INDEX_NAME, TXS)?;
        let shadowed = nested(&root, TX_INDEX_NAME, SHADOWED)?;

        let hash = block.hash();
        if id_by_hash.contains(hash.as_bytes())? {
            return Err(IndexError::consistency(
                TX_INDEX_NAME,
                format!("block {hash} is already indexed"),
            ));
        }
        let block_id = match hash_by_id.last_with_prefix(&[])? {
            Some((last, _)) => decode_id(&last)?
                .checked_add(1)
                .ok_or_else(|| IndexError::corrupt(TX_INDEX_NAME, "block ids exhausted"))?,
            None => 1,
        };
        id_by_hash.put(hash.as_bytes(), &block_id.to_be_bytes())?;
        hash_by_id.put(&block_id.to_be_bytes(), hash.as_bytes())?;

        for (txid, loc) in block.txids().iter().zip(block.tx_locs()) {
            let entry = TxEntry {
                block_id,
                offset: loc.offset,
                len: loc.len,
            };
            if let Some(raw) = txs.get(txid.as_bytes())? {
                if TxEntry::decode(TX_INDEX_NAME, &raw)?.block_id != block_id {
                    debug!(%txid, %hash, "transaction id repeats an earlier one");
                    shadowed.put(&shadow_key(block_id, txid), &raw)?;
                }
            }
            txs.put(txid.as_bytes(), &entry.encode())?;
        }
        debug!(%hash, block_id, txs = block.txids().len(), "indexed transactions");
        Ok(())
    }

    fn disconnect_block(&self, tx: &WriteTx<'_>, block: &ChainBlock, _spent: &[SpentOutput]) -> IndexResult<()> {
        let root = index_bucket(tx, TX_INDEX_NAME)?;
        let id_by_hash = nested(&root, TX_INDEX_NAME, ID_BY_HASH)?;
        let hash_by_id = nested(&root, TX_INDEX_NAME, HASH_BY_ID)?;
        let txs = nested(&root, TX_INDEX_NAME, TXS)?;
        let shadowed = nested(&root, TX_INDEX_NAME, SHADOWED)?;

        let hash = block.hash();
        let block_id = match id_by_hash.get(hash.as_bytes())? {
            Some(raw) => decode_id(&raw)?,
            None => {
                return Err(IndexError::consistency(
                    TX_INDEX_NAME,
                    format!("block {hash} is not indexed"),
                ))
            }
        };

        for txid in block.txids() {
            // A txid repeated in a later block points there; leave it alone.
            let Some(raw) = txs.get(txid.as_bytes())? else {
                continue;
            };
            if TxEntry::decode(TX_INDEX_NAME, &raw)?.block_id != block_id {
                continue;
            }
            let key = shadow_key(block_id, txid);
            match shadowed.get(&key)? {
                Some(earlier) => {
                    txs.put(txid.as_bytes(), &earlier)?;
                    shadowed.delete(&key)?;
                }
                None => {
                    txs.delete(txid.as_bytes())?;
                }
            }
        }
        id_by_hash.delete(hash.as_bytes())?;
        hash_by_id.delete(&block_id.to_be_bytes())?;
        debug!(%hash, block_id, "removed indexed transactions");
        Ok(())
    }
}

/// Resolve the outputs spent by `block`'s inputs, in block order with the
/// coinbase skipped.
///
/// Outputs created earlier in the same block are taken from the block
/// itself; everything else is looked up through the transaction index.
pub fn fetch_spent_outputs<T: Tx + ?Sized>(tx: &T, block: &ChainBlock) -> IndexResult<Vec<SpentOutput>> {
    let own: HashMap<Hash, usize> = block
        .txids()
        .iter()
        .enumerate()
        .map(|(i, txid)| (*txid, i))
        .collect();

    let mut spent = Vec::new();
    for (position, transaction) in block.transactions().iter().enumerate() {
        if transaction.is_coinbase() {
            continue;
        }
        for input in &transaction.inputs {
            let prev = input.previous_output;
            let unresolved = || IndexError::UnresolvedOutput {
                hash: prev.hash,
                index: prev.index,
            };
            let output = match own.get(&prev.hash) {
                Some(&i) if i < position => block.transactions()[i]
                    .outputs
                    .get(prev.index as usize)
                    .map(SpentOutput::from),
                _ => TxIndex::fetch_transaction(tx, &prev.hash)?
                    .and_then(|t| t.outputs.get(prev.index as usize).map(SpentOutput::from)),
            };
            spent.push(output.ok_or_else(unresolved)?);
        }
    }
    Ok(spent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::IndexManager;
    use crate::test_support::{build_chain, connect, disconnect, dump, open_store};
    use xzc_types::{Block, BlockHeader, OutPoint, TxIn, TxOut};

    fn manager() -> IndexManager {
        let mut manager = IndexManager::new();
        manager.register(Box::new(TxIndex::new())).unwrap();
        manager
    }

    #[test]
    fn transactions_are_served_from_their_block_bytes() {
        let (_dir, store) = open_store();
        let manager = manager();
        manager.create_indexes(&store).unwrap();
        let blocks = build_chain(None, &[1, 2, 3]);
        for block in &blocks {
            connect(&store, &manager, block).unwrap();
        }

        store
            .view(|tx| -> IndexResult<()> {
                for (n, block) in blocks.iter().enumerate() {
                    assert_eq!(TxIndex::block_id_by_hash(tx, &block.hash())?, Some(n as u32 + 1));
                    assert_eq!(TxIndex::block_hash_by_id(tx, n as u32 + 1)?, Some(block.hash()));
                    for (txid, transaction) in block.txids().iter().zip(block.transactions()) {
                        let region = TxIndex::tx_region(tx, txid)?.unwrap();
                        assert_eq!(region.hash, block.hash());
                        assert_eq!(tx.fetch_block_region(&region)?, transaction.encode());
                        assert_eq!(TxIndex::fetch_transaction(tx, txid)?.as_ref(), Some(transaction));
                    }
                }
                assert_eq!(TxIndex::tx_region(tx, &Hash::double_sha256(b"nope"))?, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn disconnect_releases_entries_and_block_id() {
        let (_dir, store) = open_store();
        let manager = manager();
        manager.create_indexes(&store).unwrap();
        let blocks = build_chain(None, &[1, 2, 3]);
        for block in &blocks {
            connect(&store, &manager, block).unwrap();
        }
        disconnect(&store, &manager, &blocks[2]).unwrap();

        let replacement = build_chain(Some(&blocks[1]), &[9]);
        connect(&store, &manager, &replacement[0]).unwrap();

        store
            .view(|tx| -> IndexResult<()> {
                for txid in blocks[2].txids() {
                    assert_eq!(TxIndex::tx_region(tx, txid)?, None);
                }
                assert_eq!(TxIndex::block_id_by_hash(tx, &blocks[2].hash())?, None);
                assert_eq!(TxIndex::block_id_by_hash(tx, &replacement[0].hash())?, Some(3));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn repeated_txid_is_restored_on_disconnect() {
        let (_dir, store) = open_store();
        let manager = manager();
        manager.create_indexes(&store).unwrap();
        let blocks = build_chain(None, &[1, 2]);
        for block in &blocks {
            connect(&store, &manager, block).unwrap();
        }
        let before = dump(&store);

        // A block whose coinbase is byte-identical to the genesis coinbase.
        let coinbase = blocks[0].transactions()[0].clone();
        let txid = coinbase.txid();
        let mut repeat = Block {
            header: BlockHeader {
                prev_block: blocks[1].hash(),
                nonce: 77,
                ..blocks[1].block().header
            },
            transactions: vec![coinbase],
        };
        repeat.header.merkle_root = repeat.compute_merkle_root();
        let repeat = ChainBlock::new(repeat, 2);

        connect(&store, &manager, &repeat).unwrap();
        let region = store.view(|tx| TxIndex::tx_region(tx, &txid)).unwrap().unwrap();
        assert_eq!(region.hash, repeat.hash());

        disconnect(&store, &manager, &repeat).unwrap();
        let region = store.view(|tx| TxIndex::tx_region(tx, &txid)).unwrap().unwrap();
        assert_eq!(region.hash, blocks[0].hash());
        assert_eq!(dump(&store), before);
    }

    #[test]
    fn spent_outputs_resolve_across_and_within_blocks() {
        let (_dir, store) = open_store();
        let manager = manager();
        manager.create_indexes(&store).unwrap();
        let blocks = build_chain(None, &[1, 2]);
        for block in &blocks {
            connect(&store, &manager, block).unwrap();
        }

        // Block 2 spends block 1's coinbase, then spends that spend.
        let mut next = build_chain(Some(&blocks[1]), &[3])[0].block().clone();
        let first_spend = next.transactions[1].clone();
        next.transactions.push(Transaction {
            version: 1,
            inputs: vec![TxIn::new(OutPoint::new(first_spend.txid(), 0), vec![0x51], u32::MAX)],
            outputs: vec![TxOut {
                value: 1,
                pk_script: vec![0x6a],
            }],
            lock_time: 0,
        });
        next.header.merkle_root = next.compute_merkle_root();
        let next = ChainBlock::new(next, 2);

        let spent = store.view(|tx| fetch_spent_outputs(tx, &next)).unwrap();
        assert_eq!(spent.len(), 2);
        assert_eq!(spent[0], SpentOutput::from(&blocks[1].transactions()[0].outputs[0]));
        assert_eq!(spent[1], SpentOutput::from(&first_spend.outputs[0]));
    }

    #[test]
    fn unknown_spent_output_is_reported() {
        let (_dir, store) = open_store();
        let manager = manager();
        manager.create_indexes(&store).unwrap();
        let blocks = build_chain(None, &[1, 2]);
        connect(&store, &manager, &blocks[0]).unwrap();

        let orphan = build_chain(Some(&blocks[1]), &[3]);
        let err = store.view(|tx| fetch_spent_outputs(tx, &orphan[0])).unwrap_err();
        assert!(matches!(err, IndexError::UnresolvedOutput { hash, index: 0 } if hash == blocks[1].txids()[0]));
    }
}
