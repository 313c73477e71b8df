//! Transactions by address.
//!
//! Each entry is keyed `address key (21 bytes) || sequence (u64 BE)` and
//! holds the transaction's location as `block id || offset || len`, with the
//! block id shared with the transaction index. Sequence numbers count up per
//! address, so a prefix scan yields an address's transactions in chain
//! order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use xzc_db::{BlockRegion, Tx, WriteTx};
use xzc_types::{extract_address_keys, AddressKey, ChainBlock, SpentOutput, ADDRESS_KEY_SIZE};

use crate::error::{IndexError, IndexResult};
use crate::indexer::{index_bucket, indexes_bucket, Indexer};
use crate::txindex::{TxEntry, TxIndex, TX_INDEX_NAME};

pub const ADDR_INDEX_NAME: &str = "txbyaddridx";

const KEY_LEN: usize = ADDRESS_KEY_SIZE + 8;

fn entry_key(addr: &AddressKey, seq: u64) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..ADDRESS_KEY_SIZE].copy_from_slice(addr.as_bytes());
    key[ADDRESS_KEY_SIZE..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn entry_seq(key: &[u8]) -> IndexResult<u64> {
    let raw: [u8; 8] = key
        .get(ADDRESS_KEY_SIZE..)
        .and_then(|tail| tail.try_into().ok())
        .ok_or_else(|| IndexError::corrupt(ADDR_INDEX_NAME, format!("key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Addresses each transaction of `block` credits or debits, parallel to its
/// transactions.
fn addresses_by_tx(block: &ChainBlock, spent: &[SpentOutput]) -> IndexResult<Vec<BTreeSet<AddressKey>>> {
    let expected: usize = block
        .transactions()
        .iter()
        .filter(|t| !t.is_coinbase())
        .map(|t| t.inputs.len())
        .sum();
    if spent.len() != expected {
        return Err(IndexError::MissingSpentOutputs {
            block: block.hash(),
            expected,
            found: spent.len(),
        });
    }

    let mut spent = spent.iter();
    let mut out = Vec::with_capacity(block.transactions().len());
    for transaction in block.transactions() {
        let mut addrs = BTreeSet::new();
        if !transaction.is_coinbase() {
            for prev in spent.by_ref().take(transaction.inputs.len()) {
                addrs.extend(extract_address_keys(&prev.pk_script));
            }
        }
        for output in &transaction.outputs {
            addrs.extend(extract_address_keys(&output.pk_script));
        }
        out.push(addrs);
    }
    Ok(out)
}

/// Maps every address to the main-chain transactions that pay or spend it.
#[derive(Clone, Copy, Debug, Default)]
pub struct AddrIndex;

impl AddrIndex {
    pub fn new() -> Self {
        Self
    }

    /// Locations of the transactions involving `addr`, oldest first (newest
    /// first with `reverse`), after skipping `skip` of them.
    pub fn regions_for_address<T: Tx + ?Sized>(
        tx: &T,
        addr: &AddressKey,
        skip: usize,
        limit: usize,
        reverse: bool,
    ) -> IndexResult<Vec<BlockRegion>> {
        let root = index_bucket(tx, ADDR_INDEX_NAME)?;
        let mut raw = Vec::new();
        if limit > 0 {
            let mut skipped = 0;
            root.scan_prefix(addr.as_bytes(), reverse, |_, value| {
                if skipped < skip {
                    skipped += 1;
                    return Ok(true);
                }
                raw.push(value.to_vec());
                Ok(raw.len() < limit)
            })?;
        }
        raw.iter()
            .map(|value| TxIndex::resolve(tx, TxEntry::decode(ADDR_INDEX_NAME, value)?))
            .collect()
    }

    /// Number of transactions recorded for `addr`.
    pub fn tx_count<T: Tx + ?Sized>(tx: &T, addr: &AddressKey) -> IndexResult<u64> {
        let root = index_bucket(tx, ADDR_INDEX_NAME)?;
        match root.last_with_prefix(addr.as_bytes())? {
            Some((key, _)) => Ok(entry_seq(&key)? + 1),
            None => Ok(0),
        }
    }

    fn block_id(tx: &WriteTx<'_>, block: &ChainBlock) -> IndexResult<u32> {
        TxIndex::block_id_by_hash(tx, &block.hash())?.ok_or_else(|| {
            IndexError::consistency(
                ADDR_INDEX_NAME,
                format!("block {} is missing from {TX_INDEX_NAME}", block.hash()),
            )
        })
    }
}

impl Indexer for AddrIndex {
    fn name(&self) -> &'static str {
        ADDR_INDEX_NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[TX_INDEX_NAME]
    }

    fn create(&self, tx: &WriteTx<'_>) -> IndexResult<()> {
        indexes_bucket(tx)?
            .ok_or_else(|| IndexError::NotInitialized(ADDR_INDEX_NAME.to_string()))?
            .create_bucket_if_not_exists(ADDR_INDEX_NAME.as_bytes())?;
        Ok(())
    }

    fn connect_block(&self, tx: &WriteTx<'_>, block: &ChainBlock, spent: &[SpentOutput]) -> IndexResult<()> {
        let root = index_bucket(tx, ADDR_INDEX_NAME)?;
        let block_id = Self::block_id(tx, block)?;
        let mut entries = 0usize;
        for (addrs, loc) in addresses_by_tx(block, spent)?.iter().zip(block.tx_locs()) {
            let value = TxEntry {
                block_id,
                offset: loc.offset,
                len: loc.len,
            }
            .encode();
            for addr in addrs {
                let seq = match root.last_with_prefix(addr.as_bytes())? {
                    Some((key, _)) => entry_seq(&key)? + 1,
                    None => 0,
                };
                root.put(&entry_key(addr, seq), &value)?;
                entries += 1;
            }
        }
        debug!(hash = %block.hash(), entries, "indexed addresses");
        Ok(())
    }

    fn disconnect_block(&self, tx: &WriteTx<'_>, block: &ChainBlock, spent: &[SpentOutput]) -> IndexResult<()> {
        let root = index_bucket(tx, ADDR_INDEX_NAME)?;
        let block_id = Self::block_id(tx, block)?;

        let mut counts: BTreeMap<AddressKey, usize> = BTreeMap::new();
        for addrs in addresses_by_tx(block, spent)? {
            for addr in addrs {
                *counts.entry(addr).or_default() += 1;
            }
        }

        for (addr, count) in &counts {
            let mut newest = Vec::with_capacity(*count);
            root.scan_prefix(addr.as_bytes(), true, |key, value| {
                newest.push((key.to_vec(), value.to_vec()));
                Ok(newest.len() < *count)
            })?;
            if newest.len() < *count {
                return Err(IndexError::consistency(
                    ADDR_INDEX_NAME,
                    format!("{addr} has {} entries, block {} added {count}", newest.len(), block.hash()),
                ));
            }
            for (key, value) in &newest {
                if TxEntry::decode(ADDR_INDEX_NAME, value)?.block_id != block_id {
                    return Err(IndexError::consistency(
                        ADDR_INDEX_NAME,
                        format!("newest entries of {addr} do not belong to block {}", block.hash()),
                    ));
                }
                root.delete(key)?;
            }
        }
        debug!(hash = %block.hash(), addresses = counts.len(), "removed indexed addresses");
        Ok(())
    }
}
