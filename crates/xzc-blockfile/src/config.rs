use serde::{Deserialize, Serialize};

/// Flat-file tuning knobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockFileConfig {
    /// A new file is started once the next record would push the current
    /// one past this size (default: 512 MiB).
    pub max_file_size: u32,
    /// Read handles kept open at once (default: 25).
    pub max_open_files: usize,
}

impl Default for BlockFileConfig {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024,
            max_open_files: 25,
        }
    }
}
