use thiserror::Error;
use xzc_db::DbError;
use xzc_types::{Hash, TypeError};

/// Errors produced while maintaining or querying an index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Db(#[from] DbError),

    #[error("malformed block data: {0}")]
    Decode(#[from] TypeError),

    /// The indexer's tip cannot be related to the main chain; it has to be
    /// dropped and rebuilt.
    #[error("{indexer} is inconsistent with the main chain: {reason}")]
    Consistency { indexer: String, reason: String },

    #[error("{indexer} index entry is corrupt: {reason}")]
    CorruptEntry { indexer: String, reason: String },

    #[error("indexer {0} is already registered")]
    DuplicateIndexer(String),

    #[error("indexer {indexer} depends on {dependency}, which must be registered first")]
    MissingDependency { indexer: String, dependency: String },

    #[error("no index named {0}")]
    UnknownIndexer(String),

    #[error("index {0} has not been created; run initialization first")]
    NotInitialized(String),

    #[error("block {block} at height {height} does not extend the {indexer} tip")]
    TipMismatch {
        indexer: String,
        block: Hash,
        height: u32,
    },

    #[error("block {block} spends {expected} outputs but {found} were supplied")]
    MissingSpentOutputs {
        block: Hash,
        expected: usize,
        found: usize,
    },

    #[error("spent output {hash}:{index} is not in the transaction index")]
    UnresolvedOutput { hash: Hash, index: u32 },

    #[error("chain view has no main-chain block at height {0}")]
    ChainHeight(u32),

    #[error("index catch-up interrupted")]
    Interrupted,
}

impl IndexError {
    pub(crate) fn consistency(indexer: &str, reason: impl Into<String>) -> Self {
        Self::Consistency {
            indexer: indexer.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(indexer: &str, reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            indexer: indexer.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether recovering requires rebuilding the index from scratch.
    pub fn needs_reindex(&self) -> bool {
        match self {
            Self::Consistency { .. } | Self::CorruptEntry { .. } => true,
            Self::Db(e) => e.is_corruption(),
            _ => false,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
