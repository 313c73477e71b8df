use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TypeError;

/// A 32-byte double SHA-256 digest identifying a block or transaction.
///
/// Bytes are kept in the order the hash function produced them. The textual
/// form reverses them, matching the way block explorers and RPC interfaces
/// print hashes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero hash. Used as the previous-block link of a genesis block.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Wrap raw hash bytes (internal byte order).
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// `SHA256(SHA256(data))`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        Self(out)
    }

    /// Build from a 32-byte slice in internal byte order.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw bytes in internal order.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Byte-reversed hex, the customary display form.
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// First 8 characters of the display form.
    pub fn short_hex(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(8);
        s
    }

    /// Parse the byte-reversed hex display form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let mut bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        bytes.reverse();
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// `RIPEMD160(SHA256(data))`, the 20-byte digest behind pay-to-hash scripts.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_sha256_of_empty_input() {
        // Well-known value of SHA256(SHA256("")) in internal order.
        let h = Hash::double_sha256(b"");
        assert_eq!(
            hex::encode(h.as_bytes()),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn display_reverses_bytes() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let h = Hash::from_bytes(bytes);
        let s = h.to_string();
        assert!(s.ends_with("ab"));
        assert!(s.starts_with("00"));
        assert_eq!(s.len(), 64);
    }

    #[test]
    fn hex_parse_inverts_display() {
        let h = Hash::double_sha256(b"block");
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(matches!(Hash::from_hex("zz"), Err(TypeError::InvalidHex(_))));
        assert_eq!(
            Hash::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        );
    }

    #[test]
    fn zero_hash() {
        assert!(Hash::ZERO.is_zero());
        assert!(!Hash::double_sha256(b"x").is_zero());
    }

    #[test]
    fn hash160_known_vector() {
        // hash160 of the compressed generator point public key.
        let pubkey =
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }
}
