//! Flat-file block storage.
//!
//! Raw block bytes live in numbered, size-capped, append-only files. Each
//! block is one record:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (serialized block)]
//! ```
//!
//! A [`BlockLocation`] names a record by file number, offset, and full record
//! length. The position where the next record will be appended is the
//! [`WriteCursor`]; the metadata store persists the cursor as of the last
//! committed transaction and [`BlockFileManager::open`] cuts the files back
//! to it, discarding anything appended by transactions that never committed.
//!
//! # Architecture
//!
//! - **BlockWriter**: appends records, rotates files at the size cap, syncs
//! - **BlockReader**: bounded cache of read handles, checksum verification
//! - **BlockFileManager**: owns both plus startup reconciliation

pub mod config;
pub mod error;
pub mod manager;
pub mod reader;
pub mod record;
pub mod writer;

pub use config::BlockFileConfig;
pub use error::{BlockFileError, BlockFileResult};
pub use manager::{BlockFileManager, RecoveryReport};
pub use reader::BlockReader;
pub use record::{file_name, BlockLocation, WriteCursor, RECORD_HEADER_SIZE};
pub use writer::BlockWriter;
