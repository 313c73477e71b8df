use thiserror::Error;

/// Errors produced while parsing or decoding chain data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("non-canonical compact size encoding for {0}")]
    NonCanonicalVarInt(u64),

    #[error("item count {count} exceeds the {remaining} bytes remaining")]
    TooManyItems { count: u64, remaining: usize },

    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    #[error("malformed witness data: {0}")]
    MalformedWitness(String),

    #[error("invalid address key: {0}")]
    InvalidAddressKey(String),
}
