//! The redb layer under buckets.
//!
//! All bucket data shares one table keyed `bucket id (u32 BE) ‖ key`, so a
//! bucket's contents form one contiguous key range. Bucket names live in a
//! second table keyed `parent id ‖ name`, and a third holds the id counter.

use std::ops::Bound;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, TableError,
    WriteTransaction,
};

use crate::error::{DbError, DbResult};

pub(crate) const METADATA: TableDefinition<&[u8], &[u8]> = TableDefinition::new("metadata");
pub(crate) const BUCKETS: TableDefinition<&[u8], u32> = TableDefinition::new("buckets");
pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const BUCKET_ID_SEQUENCE: &str = "bucket-id";

pub type BucketId = u32;

/// Id of the root bucket every transaction starts from.
pub const ROOT_BUCKET: BucketId = 0;

pub(crate) type KvPair = (Vec<u8>, Vec<u8>);

/// A redb transaction of either flavour.
pub(crate) enum MetaTxn {
    Read(ReadTransaction),
    Write(WriteTransaction),
}

/// `id ‖ suffix`
pub(crate) fn prefixed(id: BucketId, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + suffix.len());
    key.extend_from_slice(&id.to_be_bytes());
    key.extend_from_slice(suffix);
    key
}

/// Smallest byte string greater than every string starting with `prefix`,
/// or `None` when no such string exists.
pub(crate) fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn borrow_bound(b: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match b {
        Bound::Included(v) => Bound::Included(v.as_slice()),
        Bound::Excluded(v) => Bound::Excluded(v.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn is_empty_range(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

/// Whether the root bucket holds `key`. A file whose tables were never
/// committed holds nothing.
pub(crate) fn root_has_key(db: &Database, key: &[u8]) -> DbResult<bool> {
    let txn = db.begin_read()?;
    let table = match txn.open_table(METADATA) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    Ok(get_in(&table, &prefixed(ROOT_BUCKET, key))?.is_some())
}

fn get_in<T>(table: &T, key: &[u8]) -> DbResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
}

fn page_in<T>(
    table: &T,
    lower: Bound<&[u8]>,
    upper: Bound<&[u8]>,
    reverse: bool,
    limit: usize,
) -> DbResult<Vec<KvPair>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let range = table.range::<&[u8]>((lower, upper))?;
    let mut out = Vec::new();
    if reverse {
        for item in range.rev().take(limit) {
            let (k, v) = item?;
            out.push((k.value().to_vec(), v.value().to_vec()));
        }
    } else {
        for item in range.take(limit) {
            let (k, v) = item?;
            out.push((k.value().to_vec(), v.value().to_vec()));
        }
    }
    Ok(out)
}

fn child_in<T>(table: &T, key: &[u8]) -> DbResult<Option<BucketId>>
where
    T: ReadableTable<&'static [u8], u32>,
{
    Ok(table.get(key)?.map(|guard| guard.value()))
}

fn children_in<T>(table: &T, parent: BucketId) -> DbResult<Vec<(Vec<u8>, BucketId)>>
where
    T: ReadableTable<&'static [u8], u32>,
{
    let lower = parent.to_be_bytes();
    let upper = parent.checked_add(1).map(u32::to_be_bytes);
    let upper_bound = match &upper {
        Some(u) => Bound::Excluded(&u[..]),
        None => Bound::Unbounded,
    };
    let mut out = Vec::new();
    for item in table.range::<&[u8]>((Bound::Included(&lower[..]), upper_bound))? {
        let (k, v) = item?;
        out.push((k.value()[4..].to_vec(), v.value()));
    }
    Ok(out)
}

impl MetaTxn {
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Write(_))
    }

    fn writer(&self) -> DbResult<&WriteTransaction> {
        match self {
            Self::Write(txn) => Ok(txn),
            Self::Read(_) => Err(DbError::TxNotWritable),
        }
    }

    /// Create the tables of a fresh database.
    pub fn create_tables(&self) -> DbResult<()> {
        let txn = self.writer()?;
        txn.open_table(METADATA)?;
        txn.open_table(BUCKETS)?;
        txn.open_table(SEQUENCES)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        match self {
            Self::Read(txn) => get_in(&txn.open_table(METADATA)?, key),
            Self::Write(txn) => get_in(&txn.open_table(METADATA)?, key),
        }
    }

    /// Up to `limit` entries between the bounds, in key order or reversed.
    pub fn page(
        &self,
        lower: &Bound<Vec<u8>>,
        upper: &Bound<Vec<u8>>,
        reverse: bool,
        limit: usize,
    ) -> DbResult<Vec<KvPair>> {
        if limit == 0 || is_empty_range(lower, upper) {
            return Ok(Vec::new());
        }
        let (lo, hi) = (borrow_bound(lower), borrow_bound(upper));
        match self {
            Self::Read(txn) => page_in(&txn.open_table(METADATA)?, lo, hi, reverse, limit),
            Self::Write(txn) => page_in(&txn.open_table(METADATA)?, lo, hi, reverse, limit),
        }
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        let mut table = self.writer()?.open_table(METADATA)?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Returns whether the key existed.
    pub fn remove(&self, key: &[u8]) -> DbResult<bool> {
        let mut table = self.writer()?.open_table(METADATA)?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    pub fn child_bucket(&self, parent: BucketId, name: &[u8]) -> DbResult<Option<BucketId>> {
        let key = prefixed(parent, name);
        match self {
            Self::Read(txn) => child_in(&txn.open_table(BUCKETS)?, &key),
            Self::Write(txn) => child_in(&txn.open_table(BUCKETS)?, &key),
        }
    }

    /// Names and ids of the buckets directly under `parent`.
    pub fn child_buckets(&self, parent: BucketId) -> DbResult<Vec<(Vec<u8>, BucketId)>> {
        match self {
            Self::Read(txn) => children_in(&txn.open_table(BUCKETS)?, parent),
            Self::Write(txn) => children_in(&txn.open_table(BUCKETS)?, parent),
        }
    }

    pub fn insert_child(&self, parent: BucketId, name: &[u8], id: BucketId) -> DbResult<()> {
        let mut table = self.writer()?.open_table(BUCKETS)?;
        table.insert(prefixed(parent, name).as_slice(), id)?;
        Ok(())
    }

    pub fn remove_child(&self, parent: BucketId, name: &[u8]) -> DbResult<()> {
        let mut table = self.writer()?.open_table(BUCKETS)?;
        table.remove(prefixed(parent, name).as_slice())?;
        Ok(())
    }

    /// Allocate a bucket id. Ids are never reused.
    pub fn next_bucket_id(&self) -> DbResult<BucketId> {
        let mut table = self.writer()?.open_table(SEQUENCES)?;
        let last = table.get(BUCKET_ID_SEQUENCE)?.map(|g| g.value()).unwrap_or(0);
        let next = last + 1;
        let id = BucketId::try_from(next)
            .map_err(|_| DbError::CorruptMetadata("bucket id space exhausted".into()))?;
        table.insert(BUCKET_ID_SEQUENCE, next)?;
        Ok(id)
    }

    pub fn commit(self) -> DbResult<()> {
        match self {
            Self::Write(txn) => Ok(txn.commit()?),
            Self::Read(_) => Err(DbError::TxNotWritable),
        }
    }

    pub fn abort(self) -> DbResult<()> {
        match self {
            Self::Write(txn) => Ok(txn.abort()?),
            Self::Read(_) => Ok(()),
        }
    }
}
