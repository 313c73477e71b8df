use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase};
use tracing::{info, warn};
use xzc_blockfile::{BlockFileManager, BlockLocation, RecoveryReport, WriteCursor};
use xzc_types::Hash;

use crate::config::StoreConfig;
use crate::error::{DbError, DbResult};
use crate::meta::{self, MetaTxn, ROOT_BUCKET};
use crate::state::{
    self, BestState, DatabaseInfo, BLOCK_INDEX_BUCKET, DB_VERSION, INFO_KEY, WRITE_CURSOR_KEY,
};
use crate::tx::{read_block, ReadTx, Tx, WriteTx};
use crate::Bucket;

const METADATA_FILE: &str = "metadata.redb";
const BLOCKS_DIR: &str = "blocks";

/// Outcome of [`Store::check_integrity`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub blocks_checked: u64,
    pub bytes_checked: u64,
    /// Blocks whose records failed verification, with the reason.
    pub corrupt: Vec<(Hash, String)>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt.is_empty()
    }
}

/// Block and metadata storage for one network's data directory.
///
/// ```text
/// <path>/metadata.redb      buckets, block index, write cursor, best state
/// <path>/blocks/*.fdb       raw block records
/// ```
pub struct Store {
    path: PathBuf,
    db: Database,
    files: BlockFileManager,
    network: u32,
    recovery: RecoveryReport,
}

impl Store {
    /// Create a new store at `path`. Fails if one already exists.
    ///
    /// A metadata file left behind by a creation that never committed is
    /// not a store; creation picks it up and finishes the bootstrap.
    pub fn create(path: &Path, network: u32, config: StoreConfig) -> DbResult<Self> {
        let metadata = path.join(METADATA_FILE);
        let db = if metadata.exists() {
            let db = open_database(&metadata, &config)?;
            if meta::root_has_key(&db, INFO_KEY)? {
                return Err(DbError::DbExists(path.to_path_buf()));
            }
            warn!(path = %path.display(), "finishing an interrupted store creation");
            db
        } else {
            std::fs::create_dir_all(path)?;
            open_database(&metadata, &config)?
        };

        let txn = MetaTxn::Write(db.begin_write()?);
        txn.create_tables()?;
        let root = Bucket::new(&txn, ROOT_BUCKET);
        root.put(
            INFO_KEY,
            &state::encode(&DatabaseInfo {
                version: DB_VERSION,
                network,
            })?,
        )?;
        root.put(WRITE_CURSOR_KEY, &WriteCursor::default().encode())?;
        root.create_bucket_if_not_exists(BLOCK_INDEX_BUCKET)?;
        txn.commit()?;

        info!(path = %path.display(), network, "created block store");
        Self::load(path, db, network, config)
    }

    /// Open an existing store. Fails if there is none at `path`, including a
    /// creation that never committed, or if it was created for a different
    /// network.
    pub fn open(path: &Path, network: u32, config: StoreConfig) -> DbResult<Self> {
        match Self::open_initialised(path, &config)? {
            Some(db) => Self::load(path, db, network, config),
            None => Err(DbError::DbDoesNotExist(path.to_path_buf())),
        }
    }

    pub fn open_or_create(path: &Path, network: u32, config: StoreConfig) -> DbResult<Self> {
        match Self::open_initialised(path, &config)? {
            Some(db) => Self::load(path, db, network, config),
            None => Self::create(path, network, config),
        }
    }

    /// The metadata database at `path`, if a store was ever created there.
    fn open_initialised(path: &Path, config: &StoreConfig) -> DbResult<Option<Database>> {
        let metadata = path.join(METADATA_FILE);
        if !metadata.exists() {
            return Ok(None);
        }
        let db = open_database(&metadata, config)?;
        Ok(meta::root_has_key(&db, INFO_KEY)?.then_some(db))
    }

    fn load(path: &Path, db: Database, network: u32, config: StoreConfig) -> DbResult<Self> {
        let (info, cursor) = {
            let txn = MetaTxn::Read(db.begin_read()?);
            let root = Bucket::new(&txn, ROOT_BUCKET);
            let info: DatabaseInfo = match root.get(INFO_KEY)? {
                Some(raw) => state::decode("database info", &raw)?,
                None => return Err(DbError::CorruptMetadata("database info is missing".into())),
            };
            let cursor = match root.get(WRITE_CURSOR_KEY)? {
                Some(raw) => WriteCursor::decode(&raw)
                    .map_err(|e| DbError::CorruptMetadata(e.to_string()))?,
                None => return Err(DbError::CorruptMetadata("write cursor is missing".into())),
            };
            (info, cursor)
        };

        if info.version != DB_VERSION {
            return Err(DbError::VersionMismatch {
                supported: DB_VERSION,
                found: info.version,
            });
        }
        if info.network != network {
            return Err(DbError::NetworkMismatch {
                expected: network,
                found: info.network,
            });
        }

        let (files, recovery) =
            BlockFileManager::open(&path.join(BLOCKS_DIR), config.block_files, cursor)?;
        if !recovery.is_clean() {
            warn!(
                truncated = recovery.truncated_bytes,
                removed = ?recovery.removed_files,
                "recovered block files after unclean shutdown"
            );
        }
        info!(path = %path.display(), cursor = %cursor, "opened block store");

        Ok(Self {
            path: path.to_path_buf(),
            db,
            files,
            network,
            recovery,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn network(&self) -> u32 {
        self.network
    }

    pub fn block_files(&self) -> &BlockFileManager {
        &self.files
    }

    /// What was discarded from the block files when the store was opened.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn begin_read(&self) -> DbResult<ReadTx<'_>> {
        Ok(ReadTx::new(self.db.begin_read()?, &self.files))
    }

    /// Start the write transaction, waiting for any other writer to finish.
    pub fn begin_write(&self) -> DbResult<WriteTx<'_>> {
        // The block writer lock is taken before redb's so the two are always
        // acquired in the same order.
        let writer = self.files.lock_writer();
        let txn = self.db.begin_write()?;
        Ok(WriteTx::new(txn, &self.files, writer))
    }

    /// Run `f` against a read-only snapshot.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTx<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Run `f` in the write transaction and commit if it succeeds.
    ///
    /// If `f` fails or panics, nothing it did becomes visible. If `f`
    /// succeeds but the commit does not, the commit failure is returned as a
    /// [`DbError`] converted into `E`.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTx<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut tx = self.begin_write()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// The committed main-chain tip, if the chain engine has recorded one.
    pub fn best_state(&self) -> DbResult<Option<BestState>> {
        self.begin_read()?.best_state()
    }

    /// Read and verify every committed block. Corrupt records are collected,
    /// not treated as fatal.
    pub fn check_integrity(&self) -> DbResult<IntegrityReport> {
        let tx = self.begin_read()?;
        let index = tx
            .metadata()
            .bucket(BLOCK_INDEX_BUCKET)?
            .ok_or_else(|| DbError::CorruptMetadata("block index bucket is missing".into()))?;

        let mut report = IntegrityReport::default();
        index.for_each(|key, value| {
            let hash = Hash::from_slice(key)
                .map_err(|e| DbError::CorruptMetadata(format!("block index key: {e}")))?;
            let location = BlockLocation::decode(value)
                .map_err(|e| DbError::CorruptMetadata(format!("location of block {hash}: {e}")))?;
            report.blocks_checked += 1;
            report.bytes_checked += u64::from(location.payload_len());
            match read_block(&self.files, &hash, location) {
                Ok(_) => {}
                Err(e) if e.is_corruption() => report.corrupt.push((hash, e.to_string())),
                Err(e) => return Err(e),
            }
            Ok(())
        })?;

        if !report.is_ok() {
            warn!(corrupt = report.corrupt.len(), "integrity check found corrupt blocks");
        }
        Ok(report)
    }
}

fn open_database(path: &Path, config: &StoreConfig) -> DbResult<Database> {
    Ok(redb::Builder::new()
        .set_cache_size(config.metadata_cache_size)
        .create(path)?)
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;

    use super::*;
    use crate::test_support::{block_bytes, open_store, NET};
    use crate::tx::BlockRegion;
    use xzc_blockfile::file_name;
    use xzc_types::HEADER_SIZE;

    fn store_one(store: &Store, bytes: &[u8]) -> BlockLocation {
        store.update(|tx| tx.store_block(bytes)).unwrap()
    }

    fn hash_of(bytes: &[u8]) -> Hash {
        Hash::double_sha256(&bytes[..HEADER_SIZE])
    }

    #[test]
    fn create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regtest");
        {
            let store = Store::create(&path, NET, StoreConfig::default()).unwrap();
            assert_eq!(store.network(), NET);
            assert!(store.best_state().unwrap().is_none());
        }
        assert!(matches!(
            Store::create(&path, NET, StoreConfig::default()),
            Err(DbError::DbExists(_))
        ));
        let store = Store::open(&path, NET, StoreConfig::default()).unwrap();
        assert!(store.recovery_report().is_clean());
    }

    #[test]
    fn open_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::open(&dir.path().join("nope"), NET, StoreConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, DbError::DbDoesNotExist(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn interrupted_creation_is_finished_by_create() {
        let dir = tempfile::tempdir().unwrap();
        // A metadata file from a creation whose bootstrap never committed,
        // first without tables and then with empty ones.
        drop(Database::create(dir.path().join(METADATA_FILE)).unwrap());
        assert!(matches!(
            Store::open(dir.path(), NET, StoreConfig::default()),
            Err(DbError::DbDoesNotExist(_))
        ));
        {
            let db = Database::create(dir.path().join(METADATA_FILE)).unwrap();
            let txn = MetaTxn::Write(db.begin_write().unwrap());
            txn.create_tables().unwrap();
            txn.commit().unwrap();
        }
        assert!(matches!(
            Store::open(dir.path(), NET, StoreConfig::default()),
            Err(DbError::DbDoesNotExist(_))
        ));

        let store = Store::create(dir.path(), NET, StoreConfig::default()).unwrap();
        let bytes = block_bytes(4, 120);
        store_one(&store, &bytes);
        drop(store);

        let store = Store::open(dir.path(), NET, StoreConfig::default()).unwrap();
        assert!(store.view(|tx| tx.has_block(&hash_of(&bytes))).unwrap());
        assert!(matches!(
            Store::create(dir.path(), NET, StoreConfig::default()),
            Err(DbError::DbExists(_))
        ));
    }

    #[test]
    fn open_or_create_finishes_an_interrupted_creation() {
        let dir = tempfile::tempdir().unwrap();
        drop(Database::create(dir.path().join(METADATA_FILE)).unwrap());
        let store = Store::open_or_create(dir.path(), NET, StoreConfig::default()).unwrap();
        assert_eq!(store.network(), NET);
        assert!(store.best_state().unwrap().is_none());
    }

    #[test]
    fn network_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        drop(Store::create(dir.path(), NET, StoreConfig::default()).unwrap());
        let err = Store::open(dir.path(), NET + 1, StoreConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DbError::NetworkMismatch { expected, found } if expected == NET + 1 && found == NET
        ));
    }

    #[test]
    fn store_and_fetch_block() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(1, 300);
        let hash = hash_of(&bytes);
        let location = store_one(&store, &bytes);
        assert_eq!(location.payload_len() as usize, bytes.len());

        store
            .view(|tx| -> DbResult<()> {
                assert!(tx.has_block(&hash)?);
                assert_eq!(tx.fetch_block(&hash)?, bytes);
                assert_eq!(tx.fetch_block_header(&hash)?, bytes[..HEADER_SIZE].to_vec());
                let region = BlockRegion { hash, offset: 100, len: 50 };
                assert_eq!(tx.fetch_block_region(&region)?, bytes[100..150].to_vec());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(2, 120);
        store_one(&store, &bytes);
        let err = store.update(|tx| tx.store_block(&bytes)).unwrap_err();
        assert!(matches!(err, DbError::BlockExists(h) if h == hash_of(&bytes)));

        // Also within a single transaction.
        let other = block_bytes(3, 120);
        let err = store
            .update(|tx| -> DbResult<()> {
                tx.store_block(&other)?;
                tx.store_block(&other)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, DbError::BlockExists(_)));
    }

    #[test]
    fn short_block_is_rejected() {
        let (_dir, store) = open_store();
        let err = store.update(|tx| tx.store_block(&[0u8; 79])).unwrap_err();
        assert!(matches!(err, DbError::BlockTooShort(79)));
    }

    #[test]
    fn missing_block_and_bad_region() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(4, 100);
        let hash = hash_of(&bytes);
        store_one(&store, &bytes);
        store
            .view(|tx| -> DbResult<()> {
                let missing = Hash::double_sha256(b"missing");
                assert!(!tx.has_block(&missing)?);
                assert!(tx.fetch_block(&missing).unwrap_err().is_not_found());
                let region = BlockRegion { hash, offset: 90, len: 20 };
                assert!(matches!(
                    tx.fetch_block_region(&region),
                    Err(DbError::BlockRegionInvalid { available: 100, .. })
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn failed_update_leaves_no_trace() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(5, 200);
        let hash = hash_of(&bytes);

        let result: Result<(), DbError> = store.update(|tx| {
            tx.store_block(&bytes)?;
            tx.metadata().put(b"k", b"v")?;
            tx.metadata().create_bucket(b"b")?;
            tx.set_best_state(BestState { hash, height: 0 });
            Err(DbError::KeyRequired)
        });
        assert!(result.is_err());

        store
            .view(|tx| -> DbResult<()> {
                assert!(!tx.has_block(&hash)?);
                assert_eq!(tx.metadata().get(b"k")?, None);
                assert!(tx.metadata().bucket(b"b")?.is_none());
                assert!(tx.best_state()?.is_none());
                Ok(())
            })
            .unwrap();

        // The abandoned bytes are never reused for the next block.
        let next = store_one(&store, &block_bytes(6, 200));
        assert!(next.offset > 0);
    }

    #[test]
    fn panicking_update_rolls_back() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(7, 150);
        let hash = hash_of(&bytes);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), DbError> = store.update(|tx| {
                tx.store_block(&bytes)?;
                panic!("chain engine bug");
            });
        }));
        assert!(outcome.is_err());

        assert!(!store.view(|tx| tx.has_block(&hash)).unwrap());
        // The writer is usable again.
        store_one(&store, &bytes);
        assert!(store.view(|tx| tx.has_block(&hash)).unwrap());
    }

    #[test]
    fn writes_visible_inside_their_transaction() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(8, 90);
        let hash = hash_of(&bytes);
        store
            .update(|tx| -> DbResult<()> {
                tx.store_block(&bytes)?;
                assert!(tx.has_block(&hash)?);
                assert_eq!(tx.fetch_block(&hash)?, bytes);
                assert_eq!(tx.pending_blocks(), 1);
                tx.set_best_state(BestState { hash, height: 3 });
                assert_eq!(tx.best_state()?.map(|s| s.height), Some(3));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let (_dir, store) = open_store();
        store.update(|tx| tx.metadata().put(b"k", b"old")).unwrap();

        let snapshot = store.begin_read().unwrap();
        let bytes = block_bytes(9, 100);
        let hash = hash_of(&bytes);
        store
            .update(|tx| -> DbResult<()> {
                tx.metadata().put(b"k", b"new")?;
                tx.store_block(&bytes)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(snapshot.metadata().get(b"k").unwrap(), Some(b"old".to_vec()));
        assert!(!snapshot.has_block(&hash).unwrap());
        drop(snapshot);

        let fresh = store.begin_read().unwrap();
        assert_eq!(fresh.metadata().get(b"k").unwrap(), Some(b"new".to_vec()));
        assert!(fresh.has_block(&hash).unwrap());
    }

    #[test]
    fn reader_thread_keeps_its_snapshot_across_a_commit() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (_dir, store) = open_store();
        store.update(|tx| tx.metadata().put(b"k", b"old")).unwrap();
        let bytes = block_bytes(11, 100);
        let hash = hash_of(&bytes);

        let (opened_tx, opened) = mpsc::channel();
        let (committed_tx, committed) = mpsc::channel::<()>();
        let store = &store;
        std::thread::scope(|scope| {
            let reader = scope.spawn(move || {
                let snapshot = store.begin_read().unwrap();
                opened_tx.send(()).unwrap();
                committed.recv().unwrap();
                (
                    snapshot.metadata().get(b"k").unwrap(),
                    snapshot.has_block(&hash).unwrap(),
                )
            });

            opened.recv_timeout(Duration::from_secs(10)).unwrap();
            store
                .update(|tx| -> DbResult<()> {
                    tx.metadata().put(b"k", b"new")?;
                    tx.store_block(&bytes)?;
                    Ok(())
                })
                .unwrap();
            committed_tx.send(()).unwrap();

            assert_eq!(reader.join().unwrap(), (Some(b"old".to_vec()), false));
        });
        assert_eq!(
            store.view(|tx| tx.metadata().get(b"k")).unwrap(),
            Some(b"new".to_vec())
        );
    }

    #[test]
    fn readers_are_not_blocked_by_an_open_writer() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (_dir, store) = open_store();
        store.update(|tx| tx.metadata().put(b"k", b"old")).unwrap();

        let mut writer = store.begin_write().unwrap();
        writer.metadata().put(b"k", b"pending").unwrap();
        writer.store_block(&block_bytes(12, 100)).unwrap();

        let (done_tx, done) = mpsc::channel();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let done_tx = done_tx.clone();
                let store = &store;
                scope.spawn(move || {
                    let value = store.view(|tx| tx.metadata().get(b"k")).unwrap();
                    done_tx.send(value).unwrap();
                });
            }
            for _ in 0..4 {
                let value = done.recv_timeout(Duration::from_secs(10)).unwrap();
                assert_eq!(value, Some(b"old".to_vec()));
            }
        });
        writer.rollback();
        assert_eq!(
            store.view(|tx| tx.metadata().get(b"k")).unwrap(),
            Some(b"old".to_vec())
        );
    }

    #[test]
    fn best_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = block_bytes(10, 100);
        let hash = hash_of(&bytes);
        {
            let store = Store::create(dir.path(), NET, StoreConfig::default()).unwrap();
            store
                .update(|tx| -> DbResult<()> {
                    tx.store_block(&bytes)?;
                    tx.set_best_state(BestState { hash, height: 0 });
                    Ok(())
                })
                .unwrap();
        }
        let store = Store::open(dir.path(), NET, StoreConfig::default()).unwrap();
        assert_eq!(store.best_state().unwrap(), Some(BestState { hash, height: 0 }));
        assert_eq!(store.view(|tx| tx.fetch_block(&hash)).unwrap(), bytes);
    }

    #[test]
    fn flipped_byte_on_disk_is_reported_as_corruption() {
        let (_dir, store) = open_store();
        let bytes = block_bytes(11, 64);
        let hash = hash_of(&bytes);
        let location = store_one(&store, &bytes);
        let path = store.block_files().dir().join(file_name(location.file));
        let pristine = std::fs::read(&path).unwrap();

        for i in location.offset..location.offset + location.len {
            let mut damaged = pristine.clone();
            damaged[i as usize] ^= 0x80;
            std::fs::write(&path, &damaged).unwrap();
            let err = store.view(|tx| tx.fetch_block(&hash)).unwrap_err();
            assert!(err.is_corruption(), "flip at byte {i} returned {err}");
        }

        std::fs::write(&path, &pristine).unwrap();
        assert_eq!(store.view(|tx| tx.fetch_block(&hash)).unwrap(), bytes);
    }

    #[test]
    fn integrity_check_reports_damaged_blocks() {
        let (_dir, store) = open_store();
        let good = block_bytes(12, 100);
        let bad = block_bytes(13, 100);
        store_one(&store, &good);
        let location = store_one(&store, &bad);

        let path = store.block_files().dir().join(file_name(location.file));
        let mut raw = std::fs::read(&path).unwrap();
        raw[location.offset as usize + 50] ^= 1;
        std::fs::write(&path, raw).unwrap();

        let report = store.check_integrity().unwrap();
        assert_eq!(report.blocks_checked, 2);
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(report.corrupt[0].0, hash_of(&bad));
    }

    #[test]
    fn crash_after_append_before_commit_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let a = block_bytes(20, 200);
        let b = block_bytes(21, 200);
        let a_hash = hash_of(&a);
        let committed_end;
        {
            let store = Store::create(dir.path(), NET, StoreConfig::default()).unwrap();
            let location = store
                .update(|tx| -> DbResult<BlockLocation> {
                    let location = tx.store_block(&a)?;
                    tx.set_best_state(BestState { hash: a_hash, height: 0 });
                    Ok(location)
                })
                .unwrap();
            committed_end = location.end();
        }

        // Block B reached the disk and was synced, but the metadata that
        // would reference it never committed.
        let path = dir.path().join(BLOCKS_DIR).join(file_name(0));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        let mut record = Vec::new();
        record.extend_from_slice(&(b.len() as u32).to_le_bytes());
        record.extend_from_slice(&[0u8; 4]);
        record.extend_from_slice(&b);
        file.write_all(&record).unwrap();
        file.sync_all().unwrap();
        drop(file);

        let store = Store::open(dir.path(), NET, StoreConfig::default()).unwrap();
        assert_eq!(store.recovery_report().truncated_bytes, record.len() as u64);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed_end);
        assert_eq!(store.best_state().unwrap().map(|s| s.hash), Some(a_hash));
        assert!(!store.view(|tx| tx.has_block(&hash_of(&b))).unwrap());

        // Storing B for real picks up exactly where A ended.
        let location = store_one(&store, &b);
        assert_eq!(u64::from(location.offset), committed_end);
    }

    #[test]
    fn uncommitted_rotation_is_discarded_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::default();
        config.block_files.max_file_size = 512;
        {
            let store = Store::create(dir.path(), NET, config.clone()).unwrap();
            store_one(&store, &block_bytes(30, 300));
            let mut tx = store.begin_write().unwrap();
            tx.store_block(&block_bytes(31, 300)).unwrap(); // lands in file 1
            tx.rollback();
        }
        let store = Store::open(dir.path(), NET, config).unwrap();
        assert_eq!(store.recovery_report().removed_files, vec![1]);
        assert_eq!(store.block_files().file_numbers().unwrap(), vec![0]);
    }
}
