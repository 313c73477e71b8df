//! Transactional block store for the xzc node.
//!
//! Two kinds of storage sit behind one transaction:
//!
//! - **Metadata**: a tree of [`Bucket`]s over redb. Keys are namespaced by
//!   bucket, buckets nest, and every read sees one consistent snapshot.
//! - **Block files**: raw serialized blocks appended to flat files, located
//!   through an internal hash-to-location bucket.
//!
//! # Design rules
//!
//! 1. **One writer, many readers.** [`Store::update`] runs the only write
//!    transaction; [`Store::view`] snapshots are isolated from it.
//! 2. **Write-ahead ordering.** Block bytes are flushed to stable storage
//!    before the metadata that references them commits.
//! 3. **Recovery by truncation.** On open, block data past the last
//!    committed write cursor is discarded.
//! 4. **Checked reads.** Full-block reads verify the record checksum and
//!    header hash; a mismatch is corruption, never silently returned.

pub mod bucket;
pub mod config;
pub mod cursor;
pub mod error;
mod meta;
pub mod state;
pub mod store;
pub mod tx;

pub use bucket::Bucket;
pub use config::StoreConfig;
pub use cursor::Cursor;
pub use error::{DbError, DbResult, ErrorKind};
pub use meta::{BucketId, ROOT_BUCKET};
pub use state::{BestState, DatabaseInfo, DB_VERSION};
pub use store::{IntegrityReport, Store};
pub use tx::{BlockRegion, ReadTx, Tx, WriteTx};
pub use xzc_blockfile::{BlockLocation, RecoveryReport};
