use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::{BlockFileError, BlockFileResult};
use crate::record::{decode_record, file_name, BlockLocation, RECORD_HEADER_SIZE};

type Handle = Arc<Mutex<File>>;

/// Random-access reads over the block files.
///
/// Keeps at most `max_open` read handles, evicting the least recently used.
/// Reads are safe from any thread; each handle serialises its own
/// seek-then-read pair.
pub struct BlockReader {
    dir: PathBuf,
    max_open: usize,
    handles: Mutex<VecDeque<(u32, Handle)>>,
}

impl BlockReader {
    pub fn new(dir: &Path, max_open: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            max_open: max_open.max(1),
            handles: Mutex::new(VecDeque::new()),
        }
    }

    /// Read the record at `location`, verify it, and return the block bytes.
    pub fn read_record(&self, location: BlockLocation) -> BlockFileResult<Vec<u8>> {
        let mut record = vec![0u8; location.len as usize];
        self.read_at(location, u64::from(location.offset), &mut record)?;
        let payload = decode_record(location, &record)?;
        Ok(payload.to_vec())
    }

    /// Read `len` bytes starting `offset` bytes into the block at `location`.
    ///
    /// Only the requested range is read, so the record checksum is not
    /// verified.
    pub fn read_region(
        &self,
        location: BlockLocation,
        offset: u32,
        len: u32,
    ) -> BlockFileResult<Vec<u8>> {
        let available = location.payload_len();
        if u64::from(offset) + u64::from(len) > u64::from(available) {
            return Err(BlockFileError::RegionOutOfBounds {
                location,
                offset,
                len,
                available,
            });
        }
        let start = u64::from(location.offset) + u64::from(RECORD_HEADER_SIZE) + u64::from(offset);
        let mut buf = vec![0u8; len as usize];
        self.read_at(location, start, &mut buf)?;
        Ok(buf)
    }

    /// Drop any cached handle for file `n`.
    pub fn evict(&self, n: u32) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|(file, _)| *file != n);
    }

    /// Number of handles currently cached.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn read_at(&self, location: BlockLocation, pos: u64, buf: &mut [u8]) -> BlockFileResult<()> {
        let handle = self.handle(location)?;
        let mut file = handle.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(pos))?;
        match file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(BlockFileError::Corruption {
                location,
                reason: "block file ends before the record does".into(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn handle(&self, location: BlockLocation) -> BlockFileResult<Handle> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(i) = handles.iter().position(|(n, _)| *n == location.file) {
            if let Some(entry) = handles.remove(i) {
                let handle = Arc::clone(&entry.1);
                handles.push_back(entry);
                return Ok(handle);
            }
        }

        let path = self.dir.join(file_name(location.file));
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BlockFileError::Corruption {
                    location,
                    reason: format!("block file {} is missing", path.display()),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let handle = Arc::new(Mutex::new(file));
        handles.push_back((location.file, Arc::clone(&handle)));
        while handles.len() > self.max_open {
            if let Some((evicted, _)) = handles.pop_front() {
                debug!(file = %file_name(evicted), "closing block file handle");
            }
        }
        Ok(handle)
    }
}
