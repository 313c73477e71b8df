//! Optional chain indexes for the xzc node.
//!
//! Indexes live in the block store's metadata and move with the main chain:
//! the chain engine hands every connected or disconnected block to the
//! [`IndexManager`] inside the same write transaction that moves the best
//! state, so an index can never disagree with the chain it describes.
//!
//! # Key Types
//!
//! - [`Indexer`] -- The contract an index implements
//! - [`IndexManager`] -- Registration, startup reconciliation, live updates
//! - [`TxIndex`] -- Transactions by hash
//! - [`AddrIndex`] -- Transactions by address, built on the transaction index
//! - [`ChainView`] / [`StoreChain`] -- The main chain as the manager sees it

pub mod addrindex;
pub mod chain;
pub mod config;
pub mod error;
pub mod indexer;
pub mod manager;
pub mod txindex;

pub use addrindex::{AddrIndex, ADDR_INDEX_NAME};
pub use chain::{ChainView, StoreChain};
pub use config::IndexConfig;
pub use error::{IndexError, IndexResult};
pub use indexer::{index_tip, index_tips, is_created, IndexTip, Indexer, INDEXES_BUCKET};
pub use manager::{IndexManager, InitReport};
pub use txindex::{fetch_spent_outputs, TxIndex, TX_INDEX_NAME};
