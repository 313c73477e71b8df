//! Foundation types for the xzc node.
//!
//! Everything the storage and indexing layers need to talk about chain data:
//!
//! - [`Hash`]: 32-byte double SHA-256 digest, displayed byte-reversed
//! - [`BlockHeader`], [`Block`], [`Transaction`]: the wire format, legacy or
//!   witness serialized
//! - [`ChainBlock`]: a decoded block with its hash, height, and the byte
//!   location of every transaction inside the serialized block
//! - [`AddressKey`]: the fixed-width key an output script is indexed under
//! - [`SpentOutput`]: the previous output consumed by a transaction input

pub mod block;
pub mod encode;
pub mod error;
pub mod hash;
pub mod script;
pub mod tx;

pub use block::{merkle_root, Block, BlockHeader, ChainBlock, TxLoc, HEADER_SIZE};
pub use encode::Decoder;
pub use error::TypeError;
pub use hash::{hash160, Hash};
pub use script::{extract_address_keys, AddressKey, AddressKind, ADDRESS_KEY_SIZE};
pub use tx::{OutPoint, SpentOutput, Transaction, TxIn, TxOut};
