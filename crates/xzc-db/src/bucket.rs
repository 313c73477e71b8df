use std::fmt;
use std::ops::Bound;

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::{DbError, DbResult};
use crate::meta::{prefix_end, prefixed, BucketId, KvPair, MetaTxn};

/// Entries fetched per round trip when scanning.
const SCAN_PAGE: usize = 256;

/// A namespace of key/value pairs and nested buckets.
///
/// Keys in different buckets never collide: `a/k` and `b/k` are distinct
/// entries even though both use key `k`. A bucket borrows the transaction it
/// came from and sees exactly that transaction's snapshot, including its own
/// uncommitted writes.
#[derive(Clone, Copy)]
pub struct Bucket<'tx> {
    txn: &'tx MetaTxn,
    id: BucketId,
}

fn name_str(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

impl<'tx> Bucket<'tx> {
    pub(crate) fn new(txn: &'tx MetaTxn, id: BucketId) -> Self {
        Self { txn, id }
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    pub fn is_writable(&self) -> bool {
        self.txn.is_writable()
    }

    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.txn.get(&prefixed(self.id, key))
    }

    pub fn contains(&self, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        if key.is_empty() {
            return Err(DbError::KeyRequired);
        }
        self.txn.insert(&prefixed(self.id, key), value)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &[u8]) -> DbResult<bool> {
        if key.is_empty() {
            return Err(DbError::KeyRequired);
        }
        self.txn.remove(&prefixed(self.id, key))
    }

    /// Nested bucket `name`, if it exists.
    pub fn bucket(&self, name: &[u8]) -> DbResult<Option<Bucket<'tx>>> {
        Ok(self
            .txn
            .child_bucket(self.id, name)?
            .map(|id| Bucket::new(self.txn, id)))
    }

    pub fn create_bucket(&self, name: &[u8]) -> DbResult<Bucket<'tx>> {
        if name.is_empty() {
            return Err(DbError::KeyRequired);
        }
        if !self.is_writable() {
            return Err(DbError::TxNotWritable);
        }
        if self.txn.child_bucket(self.id, name)?.is_some() {
            return Err(DbError::BucketExists(name_str(name)));
        }
        let id = self.txn.next_bucket_id()?;
        self.txn.insert_child(self.id, name, id)?;
        debug!(parent = self.id, id, name = %name_str(name), "created bucket");
        Ok(Bucket::new(self.txn, id))
    }

    pub fn create_bucket_if_not_exists(&self, name: &[u8]) -> DbResult<Bucket<'tx>> {
        match self.bucket(name)? {
            Some(bucket) => Ok(bucket),
            None => self.create_bucket(name),
        }
    }

    /// Delete nested bucket `name` with everything it contains, recursively.
    pub fn delete_bucket(&self, name: &[u8]) -> DbResult<()> {
        if !self.is_writable() {
            return Err(DbError::TxNotWritable);
        }
        let id = self
            .txn
            .child_bucket(self.id, name)?
            .ok_or_else(|| DbError::BucketNotFound(name_str(name)))?;
        Bucket::new(self.txn, id).purge()?;
        self.txn.remove_child(self.id, name)?;
        debug!(parent = self.id, id, name = %name_str(name), "deleted bucket");
        Ok(())
    }

    fn purge(&self) -> DbResult<()> {
        for (name, child) in self.txn.child_buckets(self.id)? {
            Bucket::new(self.txn, child).purge()?;
            self.txn.remove_child(self.id, &name)?;
        }
        let (lower, upper) = self.bounds(&[]);
        loop {
            let page = self.txn.page(&lower, &upper, false, SCAN_PAGE)?;
            for (key, _) in &page {
                self.txn.remove(key)?;
            }
            if page.len() < SCAN_PAGE {
                return Ok(());
            }
        }
    }

    /// Names of the buckets nested directly in this one, in name order.
    pub fn bucket_names(&self) -> DbResult<Vec<Vec<u8>>> {
        Ok(self
            .txn
            .child_buckets(self.id)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    pub fn cursor(&self) -> Cursor<'tx> {
        Cursor::new(*self)
    }

    /// Visit every key/value pair in key order.
    pub fn for_each<F>(&self, mut f: F) -> DbResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> DbResult<()>,
    {
        self.scan_prefix(&[], false, |k, v| {
            f(k, v)?;
            Ok(true)
        })
    }

    /// Visit pairs whose key starts with `prefix`, ascending or descending,
    /// until `f` returns `false`.
    ///
    /// Entries are fetched a page at a time, so `f` may read or write through
    /// the same transaction.
    pub fn scan_prefix<F>(&self, prefix: &[u8], reverse: bool, mut f: F) -> DbResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> DbResult<bool>,
    {
        let (mut lower, mut upper) = self.bounds(prefix);
        loop {
            let page = self.txn.page(&lower, &upper, reverse, SCAN_PAGE)?;
            for (key, value) in &page {
                if !f(&key[4..], value)? {
                    return Ok(());
                }
            }
            match page.into_iter().last() {
                Some((last, _)) if !reverse => lower = Bound::Excluded(last),
                Some((last, _)) => upper = Bound::Excluded(last),
                None => return Ok(()),
            }
        }
    }

    /// Entry with the greatest key starting with `prefix`.
    pub fn last_with_prefix(&self, prefix: &[u8]) -> DbResult<Option<KvPair>> {
        self.edge_with_prefix(prefix, true)
    }

    /// Entry with the smallest key starting with `prefix`.
    pub fn first_with_prefix(&self, prefix: &[u8]) -> DbResult<Option<KvPair>> {
        self.edge_with_prefix(prefix, false)
    }

    fn edge_with_prefix(&self, prefix: &[u8], reverse: bool) -> DbResult<Option<KvPair>> {
        let (lower, upper) = self.bounds(prefix);
        Ok(self
            .txn
            .page(&lower, &upper, reverse, 1)?
            .into_iter()
            .next()
            .map(|(k, v)| (k[4..].to_vec(), v)))
    }

    pub(crate) fn txn(&self) -> &'tx MetaTxn {
        self.txn
    }

    /// Full-key bounds covering this bucket's keys that start with `prefix`.
    pub(crate) fn bounds(&self, prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let start = prefixed(self.id, prefix);
        let end = match prefix_end(&start) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        (Bound::Included(start), end)
    }
}

impl fmt::Debug for Bucket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("writable", &self.is_writable())
            .finish()
    }
}
