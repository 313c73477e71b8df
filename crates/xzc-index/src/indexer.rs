//! The contract every index implements, and the shared bookkeeping the
//! manager keeps for it.
//!
//! ```text
//! xzcidx/
//!   idxtips/            indexer name -> hash || height (u32 LE), or empty
//!   <indexer name>/     private schema of that indexer
//! ```

use xzc_db::{Bucket, Tx, WriteTx};
use xzc_types::{ChainBlock, Hash, SpentOutput};

use crate::error::{IndexError, IndexResult};

pub const INDEXES_BUCKET: &[u8] = b"xzcidx";
pub const TIPS_BUCKET: &[u8] = b"idxtips";

/// An optional index over the main chain.
///
/// `connect_block` and `disconnect_block` run inside the chain engine's write
/// transaction; `disconnect_block` must exactly undo the matching
/// `connect_block`. The manager records the tip, so implementations only
/// maintain their own buckets.
pub trait Indexer: Send + Sync {
    /// Stable identity, also the name of the indexer's bucket.
    fn name(&self) -> &'static str;

    /// Indexers that must be registered, and therefore run, before this one.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether `connect_block`/`disconnect_block` read the spent outputs.
    fn needs_spent_outputs(&self) -> bool {
        true
    }

    /// Create the indexer's buckets. Called once, before its first block.
    fn create(&self, tx: &WriteTx<'_>) -> IndexResult<()>;

    fn connect_block(
        &self,
        tx: &WriteTx<'_>,
        block: &ChainBlock,
        spent: &[SpentOutput],
    ) -> IndexResult<()>;

    fn disconnect_block(
        &self,
        tx: &WriteTx<'_>,
        block: &ChainBlock,
        spent: &[SpentOutput],
    ) -> IndexResult<()>;
}

/// The last block an indexer processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexTip {
    pub hash: Hash,
    pub height: u32,
}

impl IndexTip {
    pub const ENCODED_LEN: usize = 36;

    pub fn of(block: &ChainBlock) -> Self {
        Self {
            hash: block.hash(),
            height: block.height(),
        }
    }

    /// The tip left behind once `block` is disconnected.
    pub fn before(block: &ChainBlock) -> Option<Self> {
        block.height().checked_sub(1).map(|height| Self {
            hash: block.prev_hash(),
            height,
        })
    }

    /// Whether `block` is the next block after `tip`.
    pub fn is_extended_by(tip: Option<Self>, block: &ChainBlock) -> bool {
        match tip {
            None => block.height() == 0,
            Some(tip) => tip.hash == block.prev_hash() && tip.height + 1 == block.height(),
        }
    }

    fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..32].copy_from_slice(self.hash.as_bytes());
        out[32..].copy_from_slice(&self.height.to_le_bytes());
        out
    }

    fn decode(name: &str, bytes: &[u8]) -> IndexResult<Option<Self>> {
        match bytes.len() {
            0 => Ok(None),
            Self::ENCODED_LEN => {
                let mut height = [0u8; 4];
                height.copy_from_slice(&bytes[32..]);
                Ok(Some(Self {
                    hash: Hash::from_slice(&bytes[..32])?,
                    height: u32::from_le_bytes(height),
                }))
            }
            n => Err(IndexError::corrupt(name, format!("tip record of {n} bytes"))),
        }
    }
}

pub fn indexes_bucket<T: Tx + ?Sized>(tx: &T) -> IndexResult<Option<Bucket<'_>>> {
    Ok(tx.metadata().bucket(INDEXES_BUCKET)?)
}

fn tips_bucket<T: Tx + ?Sized>(tx: &T) -> IndexResult<Option<Bucket<'_>>> {
    match indexes_bucket(tx)? {
        Some(root) => Ok(root.bucket(TIPS_BUCKET)?),
        None => Ok(None),
    }
}

/// The private bucket of indexer `name`.
pub fn index_bucket<'a, T: Tx + ?Sized>(tx: &'a T, name: &str) -> IndexResult<Bucket<'a>> {
    indexes_bucket(tx)?
        .map(|root| root.bucket(name.as_bytes()))
        .transpose()?
        .flatten()
        .ok_or_else(|| IndexError::NotInitialized(name.to_string()))
}

/// A bucket nested inside an indexer's bucket.
pub(crate) fn nested<'a>(parent: &Bucket<'a>, indexer: &str, name: &[u8]) -> IndexResult<Bucket<'a>> {
    parent.bucket(name)?.ok_or_else(|| {
        IndexError::corrupt(
            indexer,
            format!("missing bucket {}", String::from_utf8_lossy(name)),
        )
    })
}

/// Whether indexer `name` has been created in this store.
pub fn is_created<T: Tx + ?Sized>(tx: &T, name: &str) -> IndexResult<bool> {
    match tips_bucket(tx)? {
        Some(tips) => Ok(tips.contains(name.as_bytes())?),
        None => Ok(false),
    }
}

/// The last block indexer `name` processed; `None` before its first block.
pub fn index_tip<T: Tx + ?Sized>(tx: &T, name: &str) -> IndexResult<Option<IndexTip>> {
    let raw = tips_bucket(tx)?
        .map(|tips| tips.get(name.as_bytes()))
        .transpose()?
        .flatten()
        .ok_or_else(|| IndexError::NotInitialized(name.to_string()))?;
    IndexTip::decode(name, &raw)
}

/// Every created index with its tip, in name order.
pub fn index_tips<T: Tx + ?Sized>(tx: &T) -> IndexResult<Vec<(String, Option<IndexTip>)>> {
    let mut out = Vec::new();
    if let Some(tips) = tips_bucket(tx)? {
        tips.for_each(|key, value| {
            let name = String::from_utf8_lossy(key).into_owned();
            let tip = IndexTip::decode(&name, value).map_err(|e| {
                xzc_db::DbError::CorruptMetadata(e.to_string())
            })?;
            out.push((name, tip));
            Ok(())
        })?;
    }
    Ok(out)
}

pub(crate) fn write_tip(tx: &WriteTx<'_>, name: &str, tip: Option<IndexTip>) -> IndexResult<()> {
    let tips = tips_bucket(tx)?.ok_or_else(|| IndexError::NotInitialized(name.to_string()))?;
    match tip {
        Some(tip) => tips.put(name.as_bytes(), &tip.encode())?,
        None => tips.put(name.as_bytes(), &[])?,
    }
    Ok(())
}

/// Create the shared buckets and mark `name` as created with nothing indexed.
pub(crate) fn register_tip(tx: &WriteTx<'_>, name: &str) -> IndexResult<()> {
    let root = tx.metadata().create_bucket_if_not_exists(INDEXES_BUCKET)?;
    root.create_bucket_if_not_exists(TIPS_BUCKET)?
        .put(name.as_bytes(), &[])?;
    Ok(())
}

/// Remove indexer `name`'s buckets and tip. Returns whether anything existed.
pub(crate) fn remove_index(tx: &WriteTx<'_>, name: &str) -> IndexResult<bool> {
    let Some(root) = indexes_bucket(tx)? else {
        return Ok(false);
    };
    let mut existed = false;
    if root.bucket(name.as_bytes())?.is_some() {
        root.delete_bucket(name.as_bytes())?;
        existed = true;
    }
    if let Some(tips) = root.bucket(TIPS_BUCKET)? {
        existed |= tips.delete(name.as_bytes())?;
    }
    Ok(existed)
}
