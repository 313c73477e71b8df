use serde::{Deserialize, Serialize};
use xzc_blockfile::BlockFileConfig;

/// Configuration for a [`Store`](crate::Store).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page cache for the metadata database, in bytes (default: 64 MiB).
    pub metadata_cache_size: usize,
    pub block_files: BlockFileConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            metadata_cache_size: 64 * 1024 * 1024,
            block_files: BlockFileConfig::default(),
        }
    }
}
