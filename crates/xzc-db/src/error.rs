use std::path::PathBuf;

use thiserror::Error;
use xzc_blockfile::BlockFileError;
use xzc_types::Hash;

/// Broad failure classes callers apply policy to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stored data failed an integrity check. Halt rather than continue.
    Corruption,
    /// The filesystem or metadata engine failed. Usually fatal.
    Io,
    /// A requested item does not exist. A normal outcome.
    NotFound,
    /// The caller asked for something the store cannot do.
    Usage,
    /// A transaction could not be committed.
    Transaction,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store error: {0}")]
    Metadata(#[from] redb::Error),

    #[error("transaction commit failed: {0}")]
    Commit(#[source] redb::CommitError),

    #[error("block file error: {0}")]
    BlockFile(#[from] BlockFileError),

    #[error("corrupt block {hash}: {reason}")]
    Corruption { hash: Hash, reason: String },

    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    #[error("block not found: {0}")]
    BlockNotFound(Hash),

    #[error("block already stored: {0}")]
    BlockExists(Hash),

    #[error("block of {0} bytes is shorter than a block header")]
    BlockTooShort(usize),

    #[error("region {offset}+{len} lies outside block {hash} of {available} bytes")]
    BlockRegionInvalid {
        hash: Hash,
        offset: u32,
        len: u32,
        available: u32,
    },

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketExists(String),

    #[error("a non-empty key is required")]
    KeyRequired,

    #[error("write operation on a read-only transaction")]
    TxNotWritable,

    #[error("database belongs to network {found:#010x}, opened as {expected:#010x}")]
    NetworkMismatch { expected: u32, found: u32 },

    #[error("unsupported database version {found} (this build reads version {supported})")]
    VersionMismatch { supported: u32, found: u32 },

    #[error("database already exists at {0}")]
    DbExists(PathBuf),

    #[error("no database at {0}")]
    DbDoesNotExist(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(String),
}

macro_rules! impl_from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for DbError {
                fn from(e: $ty) -> Self {
                    DbError::Metadata(e.into())
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
);

impl From<redb::CommitError> for DbError {
    fn from(e: redb::CommitError) -> Self {
        DbError::Commit(e)
    }
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Corruption { .. } | Self::CorruptMetadata(_) => ErrorKind::Corruption,
            Self::BlockFile(e) if e.is_corruption() => ErrorKind::Corruption,
            Self::Io(_) | Self::Metadata(_) | Self::BlockFile(_) => ErrorKind::Io,
            Self::Commit(_) => ErrorKind::Transaction,
            Self::BlockNotFound(_) | Self::BucketNotFound(_) | Self::DbDoesNotExist(_) => {
                ErrorKind::NotFound
            }
            Self::BlockExists(_)
            | Self::BlockTooShort(_)
            | Self::BlockRegionInvalid { .. }
            | Self::BucketExists(_)
            | Self::KeyRequired
            | Self::TxNotWritable
            | Self::NetworkMismatch { .. }
            | Self::VersionMismatch { .. }
            | Self::DbExists(_)
            | Self::Serialization(_) => ErrorKind::Usage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }
}

pub type DbResult<T> = Result<T, DbError>;
