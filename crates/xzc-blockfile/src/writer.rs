use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{BlockFileError, BlockFileResult};
use crate::record::{encode_record, file_name, BlockLocation, WriteCursor, RECORD_HEADER_SIZE};

/// Appends block records to the current file.
///
/// The writer never seeks backwards. Bytes appended by a transaction that
/// later fails stay where they are; the cursor only moves forward for the
/// rest of the session.
pub struct BlockWriter {
    dir: PathBuf,
    max_file_size: u32,
    cursor: WriteCursor,
    file: Option<File>,
    /// Files with appends not yet flushed to stable storage.
    unsynced: BTreeSet<u32>,
}

impl BlockWriter {
    pub(crate) fn new(dir: &Path, max_file_size: u32, cursor: WriteCursor) -> Self {
        Self {
            dir: dir.to_path_buf(),
            max_file_size,
            cursor,
            file: None,
            unsynced: BTreeSet::new(),
        }
    }

    /// Where the next record will be appended.
    pub fn cursor(&self) -> WriteCursor {
        self.cursor
    }

    /// Append one block record and return its location. Not durable until
    /// [`sync`](Self::sync) succeeds.
    pub fn write_block(&mut self, payload: &[u8]) -> BlockFileResult<BlockLocation> {
        let record_len = payload.len() as u64 + u64::from(RECORD_HEADER_SIZE);
        if record_len > u64::from(self.max_file_size) {
            return Err(BlockFileError::BlockTooLarge {
                size: payload.len(),
                max: self.max_file_size,
            });
        }
        if self.cursor.offset > 0
            && u64::from(self.cursor.offset) + record_len > u64::from(self.max_file_size)
        {
            self.rotate()?;
        }

        let record = encode_record(payload);
        let location = BlockLocation {
            file: self.cursor.file,
            offset: self.cursor.offset,
            len: record_len as u32,
        };

        let result = self.current_file().and_then(|f| Ok(f.write_all(&record)?));
        // Once the file is open, even a failed append may have left bytes.
        if self.file.is_some() {
            self.unsynced.insert(location.file);
        }
        if let Err(e) = result {
            warn!(%location, error = %e, "block append failed");
            self.resync();
            return Err(e);
        }

        self.cursor.offset += location.len;
        debug!(%location, "block appended");
        Ok(location)
    }

    /// Flush every file appended to since the last successful sync,
    /// including files whose handle was dropped by a rotation or a resync.
    pub fn sync(&mut self) -> BlockFileResult<()> {
        while let Some(n) = self.unsynced.first().copied() {
            match &self.file {
                Some(file) if n == self.cursor.file => file.sync_all()?,
                _ => OpenOptions::new()
                    .write(true)
                    .open(self.file_path(n))?
                    .sync_all()?,
            }
            self.unsynced.remove(&n);
        }
        Ok(())
    }

    /// Whether any appended bytes still await [`sync`](Self::sync).
    pub fn has_unsynced(&self) -> bool {
        !self.unsynced.is_empty()
    }

    /// Re-derive the cursor from the current file's length after a failed
    /// or interrupted append, so a torn record is never overwritten.
    pub fn resync(&mut self) {
        self.file = None;
        let path = self.file_path(self.cursor.file);
        match fs::metadata(&path) {
            Ok(meta) => {
                let len = u32::try_from(meta.len()).unwrap_or(u32::MAX);
                if len != self.cursor.offset {
                    warn!(from = self.cursor.offset, to = len, "write cursor resynchronised");
                }
                // An overfull file is retired so the cap still holds.
                if len > self.max_file_size {
                    self.cursor = WriteCursor::new(self.cursor.file + 1, 0);
                } else {
                    self.cursor.offset = len;
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "cannot stat block file"),
        }
    }

    fn rotate(&mut self) -> BlockFileResult<()> {
        self.file = None;
        self.cursor = WriteCursor::new(self.cursor.file + 1, 0);
        info!(file = %file_name(self.cursor.file), "starting new block file");
        Ok(())
    }

    fn current_file(&mut self) -> BlockFileResult<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_path(self.cursor.file))?,
        };
        Ok(self.file.insert(file))
    }

    fn file_path(&self, n: u32) -> PathBuf {
        self.dir.join(file_name(n))
    }
}
