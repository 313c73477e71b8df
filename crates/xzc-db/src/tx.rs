use std::collections::HashMap;
use std::sync::MutexGuard;

use tracing::{debug, warn};
use xzc_blockfile::{BlockFileError, BlockFileManager, BlockLocation, BlockWriter};
use xzc_types::{Hash, HEADER_SIZE};

use crate::bucket::Bucket;
use crate::error::{DbError, DbResult};
use crate::meta::{MetaTxn, ROOT_BUCKET};
use crate::state::{self, BestState, BEST_STATE_KEY, BLOCK_INDEX_BUCKET, WRITE_CURSOR_KEY};

/// A byte range inside a stored block, relative to the block's first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRegion {
    pub hash: Hash,
    pub offset: u32,
    pub len: u32,
}

/// Operations available on both read and write transactions.
pub trait Tx {
    /// The root bucket.
    fn metadata(&self) -> Bucket<'_>;

    fn is_writable(&self) -> bool;

    /// Where block `hash` is stored, if this transaction can see it.
    fn block_location(&self, hash: &Hash) -> DbResult<Option<BlockLocation>>;

    fn has_block(&self, hash: &Hash) -> DbResult<bool> {
        Ok(self.block_location(hash)?.is_some())
    }

    /// Full block bytes, checksum-verified.
    fn fetch_block(&self, hash: &Hash) -> DbResult<Vec<u8>>;

    /// A byte range of a block, read without touching the rest of it.
    fn fetch_block_region(&self, region: &BlockRegion) -> DbResult<Vec<u8>>;

    /// The 80 header bytes of block `hash`.
    fn fetch_block_header(&self, hash: &Hash) -> DbResult<Vec<u8>> {
        self.fetch_block_region(&BlockRegion {
            hash: *hash,
            offset: 0,
            len: HEADER_SIZE as u32,
        })
    }

    fn best_state(&self) -> DbResult<Option<BestState>>;
}

fn block_index(meta: &MetaTxn) -> DbResult<Bucket<'_>> {
    Bucket::new(meta, ROOT_BUCKET)
        .bucket(BLOCK_INDEX_BUCKET)?
        .ok_or_else(|| DbError::CorruptMetadata("block index bucket is missing".into()))
}

fn committed_location(meta: &MetaTxn, hash: &Hash) -> DbResult<Option<BlockLocation>> {
    match block_index(meta)?.get(hash.as_bytes())? {
        Some(raw) => BlockLocation::decode(&raw)
            .map(Some)
            .map_err(|e| DbError::CorruptMetadata(format!("location of block {hash}: {e}"))),
        None => Ok(None),
    }
}

fn committed_best_state(meta: &MetaTxn) -> DbResult<Option<BestState>> {
    Bucket::new(meta, ROOT_BUCKET)
        .get(BEST_STATE_KEY)?
        .map(|raw| state::decode("best state", &raw))
        .transpose()
}

fn block_file_error(hash: &Hash, e: BlockFileError) -> DbError {
    if e.is_corruption() {
        DbError::Corruption {
            hash: *hash,
            reason: e.to_string(),
        }
    } else {
        e.into()
    }
}

pub(crate) fn read_block(
    files: &BlockFileManager,
    hash: &Hash,
    location: BlockLocation,
) -> DbResult<Vec<u8>> {
    let bytes = files
        .read_block(location)
        .map_err(|e| block_file_error(hash, e))?;
    if bytes.len() < HEADER_SIZE {
        return Err(DbError::Corruption {
            hash: *hash,
            reason: format!("stored block is only {} bytes", bytes.len()),
        });
    }
    let actual = Hash::double_sha256(&bytes[..HEADER_SIZE]);
    if actual != *hash {
        return Err(DbError::Corruption {
            hash: *hash,
            reason: format!("stored header hashes to {actual}"),
        });
    }
    Ok(bytes)
}

fn read_region(
    files: &BlockFileManager,
    region: &BlockRegion,
    location: BlockLocation,
) -> DbResult<Vec<u8>> {
    let available = location.payload_len();
    if u64::from(region.offset) + u64::from(region.len) > u64::from(available) {
        return Err(DbError::BlockRegionInvalid {
            hash: region.hash,
            offset: region.offset,
            len: region.len,
            available,
        });
    }
    files
        .read_region(location, region.offset, region.len)
        .map_err(|e| block_file_error(&region.hash, e))
}

/// A consistent snapshot of committed state.
///
/// Any number of read transactions may be open alongside the writer; none of
/// them observe its changes, committed or not.
pub struct ReadTx<'s> {
    meta: MetaTxn,
    files: &'s BlockFileManager,
}

impl<'s> ReadTx<'s> {
    pub(crate) fn new(txn: redb::ReadTransaction, files: &'s BlockFileManager) -> Self {
        Self {
            meta: MetaTxn::Read(txn),
            files,
        }
    }
}

impl Tx for ReadTx<'_> {
    fn metadata(&self) -> Bucket<'_> {
        Bucket::new(&self.meta, ROOT_BUCKET)
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn block_location(&self, hash: &Hash) -> DbResult<Option<BlockLocation>> {
        committed_location(&self.meta, hash)
    }

    fn fetch_block(&self, hash: &Hash) -> DbResult<Vec<u8>> {
        let location = self
            .block_location(hash)?
            .ok_or(DbError::BlockNotFound(*hash))?;
        read_block(self.files, hash, location)
    }

    fn fetch_block_region(&self, region: &BlockRegion) -> DbResult<Vec<u8>> {
        let location = self
            .block_location(&region.hash)?
            .ok_or(DbError::BlockNotFound(region.hash))?;
        read_region(self.files, region, location)
    }

    fn best_state(&self) -> DbResult<Option<BestState>> {
        committed_best_state(&self.meta)
    }
}

/// The single writer.
///
/// Blocks passed to [`store_block`](Self::store_block) are appended to the
/// flat files immediately but stay invisible to every other transaction until
/// [`commit`](Self::commit), which makes the appends durable first and only
/// then commits the metadata that references them. Dropping the transaction
/// without committing rolls it back; appended bytes are simply never
/// referenced.
pub struct WriteTx<'s> {
    meta: MetaTxn,
    files: &'s BlockFileManager,
    writer: MutexGuard<'s, BlockWriter>,
    pending: HashMap<Hash, BlockLocation>,
    pending_order: Vec<Hash>,
    best_state: Option<BestState>,
}

impl<'s> WriteTx<'s> {
    pub(crate) fn new(
        txn: redb::WriteTransaction,
        files: &'s BlockFileManager,
        writer: MutexGuard<'s, BlockWriter>,
    ) -> Self {
        Self {
            meta: MetaTxn::Write(txn),
            files,
            writer,
            pending: HashMap::new(),
            pending_order: Vec::new(),
            best_state: None,
        }
    }

    /// Append a serialized block. Its identity is the hash of its first 80
    /// bytes.
    pub fn store_block(&mut self, bytes: &[u8]) -> DbResult<BlockLocation> {
        if bytes.len() < HEADER_SIZE {
            return Err(DbError::BlockTooShort(bytes.len()));
        }
        let hash = Hash::double_sha256(&bytes[..HEADER_SIZE]);
        if self.has_block(&hash)? {
            return Err(DbError::BlockExists(hash));
        }
        let location = self.writer.write_block(bytes)?;
        self.pending.insert(hash, location);
        self.pending_order.push(hash);
        debug!(%hash, %location, "staged block");
        Ok(location)
    }

    /// Record the main-chain tip, written as part of this transaction.
    pub fn set_best_state(&mut self, state: BestState) {
        self.best_state = Some(state);
    }

    /// Blocks stored by this transaction so far.
    pub fn pending_blocks(&self) -> usize {
        self.pending_order.len()
    }

    /// Apply every change atomically.
    ///
    /// 1. Flush the block files to stable storage.
    /// 2. Write the block locations, the new write cursor, and the best state.
    /// 3. Commit the metadata.
    ///
    /// A failure at step 1 aborts with nothing written. A failure at step 3
    /// leaves the flushed bytes unreferenced; the write cursor keeps moving
    /// forward so they are never overwritten in this session.
    pub fn commit(mut self) -> DbResult<()> {
        if !self.pending_order.is_empty() {
            self.writer.sync()?;

            let index = block_index(&self.meta)?;
            for hash in &self.pending_order {
                if let Some(location) = self.pending.get(hash) {
                    index.put(hash.as_bytes(), &location.encode())?;
                }
            }
            let cursor = self.writer.cursor();
            Bucket::new(&self.meta, ROOT_BUCKET).put(WRITE_CURSOR_KEY, &cursor.encode())?;
        }
        if let Some(best) = &self.best_state {
            Bucket::new(&self.meta, ROOT_BUCKET).put(BEST_STATE_KEY, &state::encode(best)?)?;
        }

        let blocks = self.pending_order.len();
        match self.meta.commit() {
            Ok(()) => {
                debug!(blocks, "write transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(blocks, error = %e, "metadata commit failed; appended blocks left unreferenced");
                Err(e)
            }
        }
    }

    /// Discard every change.
    pub fn rollback(self) {
        let blocks = self.pending_order.len();
        if let Err(e) = self.meta.abort() {
            warn!(error = %e, "metadata abort failed");
        }
        debug!(blocks, "write transaction rolled back");
    }
}

impl Tx for WriteTx<'_> {
    fn metadata(&self) -> Bucket<'_> {
        Bucket::new(&self.meta, ROOT_BUCKET)
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn block_location(&self, hash: &Hash) -> DbResult<Option<BlockLocation>> {
        match self.pending.get(hash) {
            Some(location) => Ok(Some(*location)),
            None => committed_location(&self.meta, hash),
        }
    }

    fn fetch_block(&self, hash: &Hash) -> DbResult<Vec<u8>> {
        let location = self
            .block_location(hash)?
            .ok_or(DbError::BlockNotFound(*hash))?;
        read_block(self.files, hash, location)
    }

    fn fetch_block_region(&self, region: &BlockRegion) -> DbResult<Vec<u8>> {
        let location = self
            .block_location(&region.hash)?
            .ok_or(DbError::BlockNotFound(region.hash))?;
        read_region(self.files, region, location)
    }

    fn best_state(&self) -> DbResult<Option<BestState>> {
        match self.best_state {
            Some(state) => Ok(Some(state)),
            None => committed_best_state(&self.meta),
        }
    }
}
