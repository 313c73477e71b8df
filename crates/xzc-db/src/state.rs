//! Records the store keeps about itself in the root bucket.

use serde::{Deserialize, Serialize};
use xzc_types::Hash;

use crate::error::{DbError, DbResult};

/// Version of the on-disk layout this build reads and writes.
pub const DB_VERSION: u32 = 1;

pub(crate) const INFO_KEY: &[u8] = b"xzcdb-info";
pub(crate) const WRITE_CURSOR_KEY: &[u8] = b"xzcdb-writeloc";
pub(crate) const BEST_STATE_KEY: &[u8] = b"xzcdb-bestchain";
pub(crate) const BLOCK_INDEX_BUCKET: &[u8] = b"xzcdb-blockidx";

/// Identity of a data directory, written once at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub version: u32,
    pub network: u32,
}

/// The tip of the main chain as last committed by the chain engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestState {
    pub hash: Hash,
    pub height: u32,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(what: &str, bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::CorruptMetadata(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_state_encoding_is_fixed_width() {
        let state = BestState {
            hash: Hash::double_sha256(b"tip"),
            height: 12,
        };
        let bytes = encode(&state).unwrap();
        assert_eq!(bytes.len(), 36);
        assert_eq!(decode::<BestState>("best state", &bytes).unwrap(), state);
    }

    #[test]
    fn truncated_record_is_corrupt_metadata() {
        let err = decode::<DatabaseInfo>("info", &[1, 0, 0]).unwrap_err();
        assert!(err.is_corruption());
    }
}
