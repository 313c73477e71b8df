//! Base58check addresses.

use xzc_types::{AddressKey, AddressKind, Hash};

use crate::error::{ChainCfgError, ChainCfgResult};
use crate::params::Params;

const CHECKSUM_LEN: usize = 4;
/// Version byte plus a 20-byte hash.
const PAYLOAD_LEN: usize = 21;

fn invalid(address: &str, reason: impl Into<String>) -> ChainCfgError {
    ChainCfgError::InvalidAddress {
        address: address.to_string(),
        reason: reason.into(),
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&Hash::double_sha256(payload).as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Encode `version ‖ hash` with a four-byte double SHA-256 checksum.
pub fn encode_base58check(version: u8, hash: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(1 + hash.len() + CHECKSUM_LEN);
    bytes.push(version);
    bytes.extend_from_slice(hash);
    let sum = checksum(&bytes);
    bytes.extend_from_slice(&sum);
    bs58::encode(bytes).into_string()
}

/// Decode a base58check string into its version byte and 20-byte hash.
pub fn decode_base58check(address: &str) -> ChainCfgResult<(u8, [u8; 20])> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| invalid(address, e.to_string()))?;
    if bytes.len() != PAYLOAD_LEN + CHECKSUM_LEN {
        return Err(invalid(address, format!("decodes to {} bytes", bytes.len())));
    }
    let (payload, sum) = bytes.split_at(PAYLOAD_LEN);
    if checksum(payload) != sum {
        return Err(invalid(address, "checksum mismatch"));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], hash))
}

impl Params {
    /// The address key a base58 address of this network is indexed under.
    ///
    /// Only pay-to-pubkey-hash and pay-to-script-hash addresses have a
    /// base58 form. A version byte that is not this network's fails with
    /// [`ChainCfgError::UnknownAddressVersion`].
    pub fn decode_address(&self, address: &str) -> ChainCfgResult<AddressKey> {
        let (version, hash) = decode_base58check(address)?;
        let kind = if version == self.pub_key_hash_addr_id {
            AddressKind::PubKeyHash
        } else if version == self.script_hash_addr_id {
            AddressKind::ScriptHash
        } else {
            return Err(ChainCfgError::UnknownAddressVersion(version));
        };
        Ok(AddressKey::new(kind, hash))
    }

    /// The base58 address of `key` on this network, if it has one.
    pub fn encode_address(&self, key: &AddressKey) -> Option<String> {
        let version = match key.kind() {
            AddressKind::PubKeyHash => self.pub_key_hash_addr_id,
            AddressKind::ScriptHash => self.script_hash_addr_id,
            AddressKind::WitnessPubKeyHash | AddressKind::WitnessScriptHash => return None,
        };
        Some(encode_base58check(version, key.hash()))
    }
}
