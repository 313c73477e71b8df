use thiserror::Error;

use crate::record::{BlockLocation, WriteCursor};

#[derive(Debug, Error)]
pub enum BlockFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt block record at {location}: {reason}")]
    Corruption {
        location: BlockLocation,
        reason: String,
    },

    #[error("block of {size} bytes does not fit in a {max} byte block file")]
    BlockTooLarge { size: usize, max: u32 },

    #[error("block files inconsistent with committed write cursor {cursor}: {reason}")]
    Inconsistent { cursor: WriteCursor, reason: String },

    #[error("region {offset}+{len} lies outside the {available} byte block at {location}")]
    RegionOutOfBounds {
        location: BlockLocation,
        offset: u32,
        len: u32,
        available: u32,
    },

    #[error("invalid {what} record: {reason}")]
    InvalidRecord { what: &'static str, reason: String },
}

impl BlockFileError {
    /// True when stored data failed an integrity check.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::Inconsistent { .. })
    }
}

pub type BlockFileResult<T> = Result<T, BlockFileError>;
