use std::fmt;

use crate::error::{BlockFileError, BlockFileResult};

/// Record header: 4 bytes length + 4 bytes CRC.
pub const RECORD_HEADER_SIZE: u32 = 8;

/// Name of block file `n`: nine zero-padded digits and an `.fdb` extension.
pub fn file_name(n: u32) -> String {
    format!("{n:09}.fdb")
}

/// Inverse of [`file_name`]; `None` for files that are not block files.
pub fn parse_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".fdb")?;
    if stem.len() != 9 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Where a block record lives: file number, byte offset, and the length of
/// the whole record including its header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockLocation {
    pub file: u32,
    pub offset: u32,
    pub len: u32,
}

impl BlockLocation {
    pub const ENCODED_LEN: usize = 12;

    /// Length of the block bytes inside the record.
    pub fn payload_len(&self) -> u32 {
        self.len.saturating_sub(RECORD_HEADER_SIZE)
    }

    /// Offset just past the record.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.len)
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.file.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> BlockFileResult<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(BlockFileError::InvalidRecord {
                what: "block location",
                reason: format!("expected {} bytes, got {}", Self::ENCODED_LEN, bytes.len()),
            });
        }
        Ok(Self {
            file: le_u32(&bytes[0..4]),
            offset: le_u32(&bytes[4..8]),
            len: le_u32(&bytes[8..12]),
        })
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", file_name(self.file), self.offset, self.len)
    }
}

/// Position at which the next record will be appended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct WriteCursor {
    pub file: u32,
    pub offset: u32,
}

impl WriteCursor {
    pub const ENCODED_LEN: usize = 12;

    pub fn new(file: u32, offset: u32) -> Self {
        Self { file, offset }
    }

    /// `file ‖ offset ‖ crc32(file ‖ offset)`, all little-endian.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.file.to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
        let crc = crc32fast::hash(&out[0..8]);
        out[8..12].copy_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> BlockFileResult<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(BlockFileError::InvalidRecord {
                what: "write cursor",
                reason: format!("expected {} bytes, got {}", Self::ENCODED_LEN, bytes.len()),
            });
        }
        let expected = le_u32(&bytes[8..12]);
        let actual = crc32fast::hash(&bytes[0..8]);
        if expected != actual {
            return Err(BlockFileError::InvalidRecord {
                what: "write cursor",
                reason: format!("checksum {actual:#010x} does not match stored {expected:#010x}"),
            });
        }
        Ok(Self {
            file: le_u32(&bytes[0..4]),
            offset: le_u32(&bytes[4..8]),
        })
    }
}

impl fmt::Display for WriteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", file_name(self.file), self.offset)
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Frame `payload` as a record.
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_HEADER_SIZE as usize + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate a record read from `location` and return its payload.
pub fn decode_record(location: BlockLocation, record: &[u8]) -> BlockFileResult<&[u8]> {
    let corrupt = |reason: String| BlockFileError::Corruption { location, reason };

    if record.len() < RECORD_HEADER_SIZE as usize {
        return Err(corrupt(format!("record of {} bytes has no header", record.len())));
    }
    let length = le_u32(&record[0..4]);
    let expected_crc = le_u32(&record[4..8]);
    let payload = &record[RECORD_HEADER_SIZE as usize..];

    if length as usize != payload.len() {
        return Err(corrupt(format!(
            "header length {length} does not match indexed length {}",
            payload.len()
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(corrupt(format!(
            "checksum {actual_crc:#010x} does not match stored {expected_crc:#010x}"
        )));
    }
    Ok(payload)
}
