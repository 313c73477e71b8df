use std::ops::Bound;

use crate::bucket::Bucket;
use crate::error::{DbError, DbResult};
use crate::meta::{prefixed, KvPair};

/// Bidirectional iteration over one bucket's key/value pairs.
///
/// The cursor remembers the key it is positioned on rather than holding a
/// live iterator, so a caller may write to the bucket between steps,
/// including deleting the current entry.
pub struct Cursor<'tx> {
    bucket: Bucket<'tx>,
    current: Option<KvPair>,
}

impl<'tx> Cursor<'tx> {
    pub(crate) fn new(bucket: Bucket<'tx>) -> Self {
        Self {
            bucket,
            current: None,
        }
    }

    /// Move to the smallest key. Returns `false` if the bucket is empty.
    pub fn first(&mut self) -> DbResult<bool> {
        let (lower, upper) = self.bucket.bounds(&[]);
        self.position(&lower, &upper, false)
    }

    /// Move to the greatest key. Returns `false` if the bucket is empty.
    pub fn last(&mut self) -> DbResult<bool> {
        let (lower, upper) = self.bucket.bounds(&[]);
        self.position(&lower, &upper, true)
    }

    /// Move to the first key greater than or equal to `key`.
    pub fn seek(&mut self, key: &[u8]) -> DbResult<bool> {
        let (_, upper) = self.bucket.bounds(&[]);
        self.position(&Bound::Included(prefixed(self.bucket.id(), key)), &upper, false)
    }

    /// Step forward. An unpositioned cursor moves to the first key.
    pub fn next(&mut self) -> DbResult<bool> {
        let Some((key, _)) = &self.current else {
            return self.first();
        };
        let lower = Bound::Excluded(prefixed(self.bucket.id(), key));
        let (_, upper) = self.bucket.bounds(&[]);
        self.position(&lower, &upper, false)
    }

    /// Step backward. An unpositioned cursor moves to the last key.
    pub fn prev(&mut self) -> DbResult<bool> {
        let Some((key, _)) = &self.current else {
            return self.last();
        };
        let upper = Bound::Excluded(prefixed(self.bucket.id(), key));
        let (lower, _) = self.bucket.bounds(&[]);
        self.position(&lower, &upper, true)
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    /// Delete the entry under the cursor. Stepping afterwards continues from
    /// the deleted key's position.
    pub fn delete(&mut self) -> DbResult<()> {
        match &self.current {
            Some((key, _)) => {
                self.bucket.delete(key)?;
                Ok(())
            }
            None => Err(DbError::KeyRequired),
        }
    }

    fn position(
        &mut self,
        lower: &Bound<Vec<u8>>,
        upper: &Bound<Vec<u8>>,
        reverse: bool,
    ) -> DbResult<bool> {
        let found = self
            .bucket
            .txn()
            .page(lower, upper, reverse, 1)?
            .into_iter()
            .next()
            .map(|(k, v)| (k[4..].to_vec(), v));
        let positioned = found.is_some();
        // Exhausting the cursor keeps the last position so prev/next can
        // still walk back.
        if positioned {
            self.current = found;
        }
        Ok(positioned)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::open_store;
    use crate::{DbError, Tx};

    fn fill(store: &crate::Store, keys: &[&[u8]]) {
        store
            .update(|tx| -> Result<(), DbError> {
                let b = tx.metadata().create_bucket(b"c")?;
                for k in keys {
                    b.put(k, &[k[0]])?;
                }
                // An entry in a sibling bucket must never leak into the cursor.
                tx.metadata().create_bucket(b"d")?.put(b"a", b"x")?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn walks_forward_and_backward() {
        let (_dir, store) = open_store();
        fill(&store, &[b"b", b"d", b"a", b"c"]);
        store
            .view(|tx| -> Result<(), DbError> {
                let mut c = tx.metadata().bucket(b"c")?.unwrap().cursor();
                let mut fwd = Vec::new();
                let mut more = c.first()?;
                while more {
                    fwd.push(c.key().unwrap().to_vec());
                    more = c.next()?;
                }
                assert_eq!(fwd, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);

                // Exhausted at the end; prev walks back from the last key.
                assert_eq!(c.key(), Some(&b"d"[..]));
                assert!(c.prev()?);
                assert_eq!(c.key(), Some(&b"c"[..]));

                assert!(c.last()?);
                assert_eq!(c.value(), Some(&b"d"[..]));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn seek_lands_on_next_key() {
        let (_dir, store) = open_store();
        fill(&store, &[b"aa", b"ac", b"ae"]);
        store
            .view(|tx| -> Result<(), DbError> {
                let mut c = tx.metadata().bucket(b"c")?.unwrap().cursor();
                assert!(c.seek(b"ab")?);
                assert_eq!(c.key(), Some(&b"ac"[..]));
                assert!(c.seek(b"ac")?);
                assert_eq!(c.key(), Some(&b"ac"[..]));
                assert!(!c.seek(b"af")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn empty_bucket_cursor() {
        let (_dir, store) = open_store();
        store
            .update(|tx| -> Result<(), DbError> {
                let mut c = tx.metadata().create_bucket(b"empty")?.cursor();
                assert!(!c.first()?);
                assert!(!c.last()?);
                assert!(c.key().is_none());
                assert!(c.delete().is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn delete_while_iterating() {
        let (_dir, store) = open_store();
        fill(&store, &[b"1", b"2", b"3", b"4"]);
        store
            .update(|tx| -> Result<(), DbError> {
                let bucket = tx.metadata().bucket(b"c")?.unwrap();
                let mut c = bucket.cursor();
                let mut more = c.first()?;
                while more {
                    if c.key() != Some(&b"3"[..]) {
                        c.delete()?;
                    }
                    more = c.next()?;
                }
                let mut left = Vec::new();
                bucket.for_each(|k, _| {
                    left.push(k.to_vec());
                    Ok(())
                })?;
                assert_eq!(left, vec![b"3".to_vec()]);
                Ok(())
            })
            .unwrap();
    }
}
