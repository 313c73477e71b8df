//! Output-script templates recognised by the address index.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::hash160;

/// Serialized size of an [`AddressKey`]: one kind byte plus a 20-byte hash.
pub const ADDRESS_KEY_SIZE: usize = 21;

const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressKind {
    PubKeyHash = 0,
    ScriptHash = 1,
    WitnessPubKeyHash = 2,
    WitnessScriptHash = 3,
}

impl AddressKind {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::PubKeyHash),
            1 => Some(Self::ScriptHash),
            2 => Some(Self::WitnessPubKeyHash),
            3 => Some(Self::WitnessScriptHash),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::PubKeyHash => "p2pkh",
            Self::ScriptHash => "p2sh",
            Self::WitnessPubKeyHash => "p2wpkh",
            Self::WitnessScriptHash => "p2wsh",
        }
    }
}

/// Fixed-width key an address is indexed under.
///
/// Pay-to-pubkey and bare multisig outputs are folded into the
/// pay-to-pubkey-hash key of each public key, and the 32-byte witness script
/// program is reduced with hash160, so every key is the same 21 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressKey([u8; ADDRESS_KEY_SIZE]);

impl AddressKey {
    pub fn new(kind: AddressKind, hash: [u8; 20]) -> Self {
        let mut key = [0u8; ADDRESS_KEY_SIZE];
        key[0] = kind as u8;
        key[1..].copy_from_slice(&hash);
        Self(key)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let key: [u8; ADDRESS_KEY_SIZE] =
            bytes.try_into().map_err(|_| TypeError::InvalidLength {
                expected: ADDRESS_KEY_SIZE,
                actual: bytes.len(),
            })?;
        if AddressKind::from_u8(key[0]).is_none() {
            return Err(TypeError::InvalidAddressKey(format!(
                "unknown kind byte {:#04x}",
                key[0]
            )));
        }
        Ok(Self(key))
    }

    pub fn kind(&self) -> AddressKind {
        // Constructors only admit known kind bytes.
        AddressKind::from_u8(self.0[0]).unwrap_or(AddressKind::PubKeyHash)
    }

    pub fn hash(&self) -> &[u8] {
        &self.0[1..]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().label(), hex::encode(self.hash()))
    }
}

impl fmt::Debug for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressKey({self})")
    }
}

fn hash20(bytes: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    out
}

fn is_pubkey(bytes: &[u8]) -> bool {
    match bytes.len() {
        33 => bytes[0] == 0x02 || bytes[0] == 0x03,
        65 => bytes[0] == 0x04,
        _ => false,
    }
}

/// Parse bare multisig `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`, returning the keys.
fn multisig_pubkeys(script: &[u8]) -> Option<Vec<&[u8]>> {
    let (&first, rest) = script.split_first()?;
    let (&last, rest) = rest.split_last()?;
    let (&n_op, mut body) = rest.split_last()?;
    if last != OP_CHECKMULTISIG || !(OP_1..=OP_16).contains(&first) || !(OP_1..=OP_16).contains(&n_op) {
        return None;
    }
    let mut keys = Vec::new();
    while let Some((&push, tail)) = body.split_first() {
        let len = push as usize;
        if tail.len() < len || !is_pubkey(&tail[..len]) {
            return None;
        }
        keys.push(&tail[..len]);
        body = &tail[len..];
    }
    let (m, n) = (first - OP_1 + 1, n_op - OP_1 + 1);
    (keys.len() == n as usize && m <= n).then_some(keys)
}

/// Address keys paid by an output script. Non-standard scripts yield none.
pub fn extract_address_keys(script: &[u8]) -> Vec<AddressKey> {
    match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            vec![AddressKey::new(AddressKind::PubKeyHash, hash20(hash))]
        }
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            vec![AddressKey::new(AddressKind::ScriptHash, hash20(hash))]
        }
        [OP_0, 0x14, program @ ..] if program.len() == 20 => {
            vec![AddressKey::new(AddressKind::WitnessPubKeyHash, hash20(program))]
        }
        [OP_0, 0x20, program @ ..] if program.len() == 32 => {
            vec![AddressKey::new(AddressKind::WitnessScriptHash, hash160(program))]
        }
        [push, pubkey @ .., OP_CHECKSIG] if *push as usize == pubkey.len() && is_pubkey(pubkey) => {
            vec![AddressKey::new(AddressKind::PubKeyHash, hash160(pubkey))]
        }
        _ => multisig_pubkeys(script)
            .map(|keys| {
                keys.into_iter()
                    .map(|pk| AddressKey::new(AddressKind::PubKeyHash, hash160(pk)))
                    .collect()
            })
            .unwrap_or_default(),
    }
}
