use thiserror::Error;
use xzc_types::Hash;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainCfgError {
    #[error("duplicate network: {0}")]
    DuplicateNet(String),

    #[error("unknown network: {0}")]
    UnknownNet(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("address version {version:#04x} belongs to another network than {network}")]
    AddressNetworkMismatch { version: u8, network: &'static str },

    #[error("unknown address version {0:#04x}")]
    UnknownAddressVersion(u8),

    #[error("unknown hd private extended key id {}", hex::encode(.0))]
    UnknownHdKeyId(Vec<u8>),

    #[error("genesis mismatch: expected {expected}, got {actual}")]
    GenesisMismatch { expected: Hash, actual: Hash },

    #[error("checkpoint mismatch at height {height}: expected {expected}, got {actual}")]
    CheckpointMismatch {
        height: u32,
        expected: Hash,
        actual: Hash,
    },
}

pub type ChainCfgResult<T> = Result<T, ChainCfgError>;
