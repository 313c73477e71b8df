use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::config::BlockFileConfig;
use crate::error::{BlockFileError, BlockFileResult};
use crate::reader::BlockReader;
use crate::record::{file_name, parse_file_name, BlockLocation, WriteCursor};
use crate::writer::BlockWriter;

/// What startup reconciliation discarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Bytes cut from the end of the committed file.
    pub truncated_bytes: u64,
    /// Files wholly past the committed cursor, now deleted.
    pub removed_files: Vec<u32>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.truncated_bytes == 0 && self.removed_files.is_empty()
    }
}

/// Owns the block directory: one writer, a shared reader.
pub struct BlockFileManager {
    dir: PathBuf,
    config: BlockFileConfig,
    writer: Mutex<BlockWriter>,
    reader: BlockReader,
}

impl BlockFileManager {
    /// Open the block directory and cut it back to `committed`, the write
    /// cursor recorded by the last committed metadata transaction.
    ///
    /// Fails with [`BlockFileError::Inconsistent`] if the files hold less
    /// data than the cursor claims; that data is referenced but gone.
    pub fn open(
        dir: &Path,
        config: BlockFileConfig,
        committed: WriteCursor,
    ) -> BlockFileResult<(Self, RecoveryReport)> {
        fs::create_dir_all(dir)?;
        let report = reconcile(dir, committed)?;
        if !report.is_clean() {
            warn!(
                truncated = report.truncated_bytes,
                removed = report.removed_files.len(),
                cursor = %committed,
                "discarded uncommitted block data"
            );
        }
        let manager = Self {
            dir: dir.to_path_buf(),
            writer: Mutex::new(BlockWriter::new(dir, config.max_file_size, committed)),
            reader: BlockReader::new(dir, config.max_open_files),
            config,
        };
        Ok((manager, report))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &BlockFileConfig {
        &self.config
    }

    /// Exclusive access to the writer.
    ///
    /// A writer poisoned by a panic mid-append is resynchronised with the
    /// file on disk before being handed out again.
    pub fn lock_writer(&self) -> MutexGuard<'_, BlockWriter> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("block writer lock poisoned; resynchronising");
                let mut guard = poisoned.into_inner();
                guard.resync();
                self.writer.clear_poison();
                guard
            }
        }
    }

    pub fn write_block(&self, payload: &[u8]) -> BlockFileResult<BlockLocation> {
        self.lock_writer().write_block(payload)
    }

    pub fn sync(&self) -> BlockFileResult<()> {
        self.lock_writer().sync()
    }

    pub fn write_cursor(&self) -> WriteCursor {
        self.lock_writer().cursor()
    }

    pub fn read_block(&self, location: BlockLocation) -> BlockFileResult<Vec<u8>> {
        self.reader.read_record(location)
    }

    pub fn read_region(
        &self,
        location: BlockLocation,
        offset: u32,
        len: u32,
    ) -> BlockFileResult<Vec<u8>> {
        self.reader.read_region(location, offset, len)
    }

    /// Numbers of the block files present, ascending.
    pub fn file_numbers(&self) -> BlockFileResult<Vec<u32>> {
        Ok(list_files(&self.dir)?.into_iter().collect())
    }

    /// Combined size of all block files.
    pub fn total_size(&self) -> BlockFileResult<u64> {
        let mut total = 0;
        for n in list_files(&self.dir)? {
            total += fs::metadata(self.dir.join(file_name(n)))?.len();
        }
        Ok(total)
    }
}

fn list_files(dir: &Path) -> io::Result<BTreeSet<u32>> {
    let mut files = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(n) = entry.file_name().to_str().and_then(parse_file_name) {
            files.insert(n);
        }
    }
    Ok(files)
}

fn reconcile(dir: &Path, committed: WriteCursor) -> BlockFileResult<RecoveryReport> {
    let inconsistent = |reason: String| BlockFileError::Inconsistent {
        cursor: committed,
        reason,
    };
    let mut report = RecoveryReport::default();
    let files = list_files(dir)?;

    for &n in files.range(committed.file.saturating_add(1)..) {
        if n == committed.file {
            continue;
        }
        fs::remove_file(dir.join(file_name(n)))?;
        info!(file = %file_name(n), "removed uncommitted block file");
        report.removed_files.push(n);
    }

    if let Some(missing) = (0..committed.file).find(|n| !files.contains(n)) {
        return Err(inconsistent(format!("block file {} is missing", file_name(missing))));
    }

    let path = dir.join(file_name(committed.file));
    match fs::metadata(&path) {
        Ok(meta) => {
            let len = meta.len();
            let want = u64::from(committed.offset);
            if len < want {
                return Err(inconsistent(format!(
                    "{} holds {len} bytes but {want} are committed",
                    file_name(committed.file)
                )));
            }
            if len > want {
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(want)?;
                file.sync_all()?;
                report.truncated_bytes = len - want;
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && committed.offset == 0 => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(inconsistent(format!(
                "block file {} is missing",
                file_name(committed.file)
            )));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(report)
}
