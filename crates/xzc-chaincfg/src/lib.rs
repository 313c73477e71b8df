//! Chain parameters for the Zcoin networks.
//!
//! The storage layer only needs a network identifier, but the operator
//! surface also uses genesis hashes and checkpoints to sanity-check imported
//! blocks. Parameters are plain data; [`NetworkRegistry`] is an explicit value
//! the caller owns rather than process-wide state.

pub mod address;
pub mod error;
pub mod params;
pub mod registry;

pub use address::{decode_base58check, encode_base58check};
pub use error::{ChainCfgError, ChainCfgResult};
pub use params::{data_dir_name, Checkpoint, Network, Params, MAIN_NET, REGRESSION_NET, TEST_NET};
pub use registry::NetworkRegistry;
