use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xzc_types::Hash;

use crate::error::{ChainCfgError, ChainCfgResult};

/// A known-good block hash at a given height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: Hash,
}

/// Parameters of one network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    /// Short name, also the default data directory name.
    pub name: &'static str,
    /// Network magic. Doubles as the store's network identifier.
    pub net: u32,
    pub default_port: u16,
    pub rpc_port: u16,
    pub genesis_hash: Hash,
    pub coinbase_maturity: u16,
    pub target_time_per_block: Duration,
    /// Ordered from oldest to newest.
    pub checkpoints: &'static [Checkpoint],

    /// Human-readable part of bech32 segwit addresses; empty when the
    /// network defines none.
    pub bech32_hrp_segwit: &'static str,
    /// Base58 version bytes.
    pub pub_key_hash_addr_id: u8,
    pub script_hash_addr_id: u8,
    pub private_key_id: u8,
    /// Unassigned (zero) on every built-in network.
    pub witness_pub_key_hash_addr_id: u8,
    pub witness_script_hash_addr_id: u8,
    /// BIP32 extended key version bytes.
    pub hd_private_key_id: [u8; 4],
    pub hd_public_key_id: [u8; 4],
    /// BIP44 coin type.
    pub hd_coin_type: u32,
}

const HD_PRIVATE_KEY_ID: [u8; 4] = [0x04, 0x35, 0x83, 0x94]; // tprv
const HD_PUBLIC_KEY_ID: [u8; 4] = [0x04, 0x35, 0x87, 0xcf]; // tpub

const fn hex_digit(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => panic!("invalid hex digit in hash literal"),
    }
}

/// Hash literal in display (byte-reversed) order, checked at compile time.
const fn hash(s: &str) -> Hash {
    let b = s.as_bytes();
    assert!(b.len() == 64, "hash literal must be 64 hex digits");
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < 32 {
        out[31 - i] = (hex_digit(b[2 * i]) << 4) | hex_digit(b[2 * i + 1]);
        i += 1;
    }
    Hash::from_bytes(out)
}

const fn checkpoint(height: u32, h: &str) -> Checkpoint {
    Checkpoint {
        height,
        hash: hash(h),
    }
}

static MAIN_NET_CHECKPOINTS: [Checkpoint; 10] = [
    checkpoint(0, "4d96a915f49d40b1e5c2844d1ee2dccb90013a990ccea12c492d22110489f0c4"),
    checkpoint(24200, "d7ed819858011474c8b0cae4ad0b9bdbb745becc4c386bc22d1220cc5a4d1787"),
    checkpoint(65000, "9e673a69c35a423f736ab66f9a195d7c42f979847a729c0f3cef2c0b8b9d0289"),
    checkpoint(84065, "a904170a5a98109b2909379d9bc03ef97a6b44d5dafbc9084b8699b0cba5aa98"),
    checkpoint(228023, "15c94667a9e941359d2ee6527e2876db1b5e7510a5ded3885ca02e7e0f516b51"),
    checkpoint(346992, "f1714fa4c7990f4b3d472eb22132891ccd3c7ad7208e2d1ab15bde68854fb0ee"),
    checkpoint(347269, "fa1e592b7ea2aa97c5f20ccd7c40f3aaaeb31d1232c978847a79f28f83b6c22a"),
    checkpoint(430000, "2f5703cf7b6f956b84fd49948cbf49dc164cfcb5a7b55903b1c4f53bc7851611"),
    checkpoint(516999, "572ed47da461743bcae526542053e7bc532de299345e4f51d77786f2870b7b28"),
    checkpoint(627610, "6000a787f2d8bb77d4f491a423241a4cc8439d862ca6cec6851aba4c79ccfedc"),
];

/// Zcoin main network.
pub static MAIN_NET: Params = Params {
    name: "xzc",
    net: 0xf1fe_d9e3,
    default_port: 5889,
    rpc_port: 5888,
    genesis_hash: hash("4d96a915f49d40b1e5c2844d1ee2dccb90013a990ccea12c492d22110489f0c4"),
    coinbase_maturity: 120,
    target_time_per_block: Duration::from_secs(150),
    checkpoints: &MAIN_NET_CHECKPOINTS,
    bech32_hrp_segwit: "",
    pub_key_hash_addr_id: 0x47, // V
    script_hash_addr_id: 0x05,  // 3
    private_key_id: 0x80,
    witness_pub_key_hash_addr_id: 0x00,
    witness_script_hash_addr_id: 0x00,
    hd_private_key_id: HD_PRIVATE_KEY_ID,
    hd_public_key_id: HD_PUBLIC_KEY_ID,
    hd_coin_type: 28,
};

/// Zcoin public test network.
pub static TEST_NET: Params = Params {
    name: "xzctest",
    net: 0xcffc_beea,
    default_port: 15889,
    rpc_port: 15888,
    genesis_hash: hash("cee8f24feb7a64c8f07916976aa4855decac79b6741ae8c2e32e2747497ad2c9"),
    coinbase_maturity: 120,
    target_time_per_block: Duration::from_secs(150),
    checkpoints: &[],
    bech32_hrp_segwit: "",
    pub_key_hash_addr_id: 0x4a, // X or W
    script_hash_addr_id: 0xc4,
    private_key_id: 0xef,
    witness_pub_key_hash_addr_id: 0x00,
    witness_script_hash_addr_id: 0x00,
    hd_private_key_id: HD_PRIVATE_KEY_ID,
    hd_public_key_id: HD_PUBLIC_KEY_ID,
    hd_coin_type: 65536,
};

/// Local regression test network.
pub static REGRESSION_NET: Params = Params {
    name: "regtest",
    net: 0xdab5_bffa,
    default_port: 18444,
    rpc_port: 19334,
    genesis_hash: hash("0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206"),
    coinbase_maturity: 100,
    target_time_per_block: Duration::from_secs(600),
    checkpoints: &[],
    bech32_hrp_segwit: "txzc",
    pub_key_hash_addr_id: 0x6f, // m or n
    script_hash_addr_id: 0xc4,  // 2
    private_key_id: 0xef,
    witness_pub_key_hash_addr_id: 0x00,
    witness_script_hash_addr_id: 0x00,
    hd_private_key_id: HD_PRIVATE_KEY_ID,
    hd_public_key_id: HD_PUBLIC_KEY_ID,
    hd_coin_type: 1,
};

impl Params {
    pub fn checkpoint_at(&self, height: u32) -> Option<&Checkpoint> {
        self.checkpoints
            .binary_search_by_key(&height, |c| c.height)
            .ok()
            .map(|i| &self.checkpoints[i])
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Fails when `height` is a checkpoint height and `hash` is not the
    /// checkpointed block.
    pub fn verify_checkpoint(&self, height: u32, hash: &Hash) -> ChainCfgResult<()> {
        match self.checkpoint_at(height) {
            Some(cp) if cp.hash != *hash => Err(ChainCfgError::CheckpointMismatch {
                height,
                expected: cp.hash,
                actual: *hash,
            }),
            _ => Ok(()),
        }
    }

    /// Check a block about to be placed at `height` against the network's
    /// genesis hash and checkpoints.
    pub fn verify_block(&self, height: u32, hash: &Hash) -> ChainCfgResult<()> {
        if height == 0 && *hash != self.genesis_hash {
            return Err(ChainCfgError::GenesisMismatch {
                expected: self.genesis_hash,
                actual: *hash,
            });
        }
        self.verify_checkpoint(height, hash)
    }
}

/// Directory name used for a network's data.
///
/// The public test network keeps its data under `testnet` rather than its
/// parameter name; every other network uses `name`.
pub fn data_dir_name(params: &Params) -> &'static str {
    if params.net == TEST_NET.net {
        "testnet"
    } else {
        params.name
    }
}

/// The built-in networks, as selected on the command line or in config files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[serde(alias = "xzc")]
    Mainnet,
    #[serde(alias = "xzctest")]
    Testnet,
    #[default]
    Regtest,
}

impl Network {
    pub fn params(self) -> &'static Params {
        match self {
            Self::Mainnet => &MAIN_NET,
            Self::Testnet => &TEST_NET,
            Self::Regtest => &REGRESSION_NET,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        })
    }
}

impl FromStr for Network {
    type Err = ChainCfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "xzc" => Ok(Self::Mainnet),
            "testnet" | "xzctest" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(ChainCfgError::UnknownNet(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_first_checkpoint() {
        let cp = MAIN_NET.checkpoint_at(0).unwrap();
        assert_eq!(cp.hash, MAIN_NET.genesis_hash);
        // The literal is in display order, the stored bytes in internal order.
        assert_eq!(MAIN_NET.genesis_hash.as_bytes()[..4], [0xc4, 0xf0, 0x89, 0x04]);
    }

    #[test]
    fn testnet_genesis_internal_order() {
        assert_eq!(TEST_NET.genesis_hash.as_bytes()[..4], [0xc9, 0xd2, 0x7a, 0x49]);
    }

    #[test]
    fn checkpoints_are_sorted() {
        assert!(MAIN_NET
            .checkpoints
            .windows(2)
            .all(|w| w[0].height < w[1].height));
        assert_eq!(MAIN_NET.latest_checkpoint().unwrap().height, 627_610);
    }

    #[test]
    fn verify_checkpoint_detects_mismatch() {
        let good = MAIN_NET.checkpoint_at(24200).unwrap().hash;
        assert!(MAIN_NET.verify_checkpoint(24200, &good).is_ok());
        assert!(MAIN_NET.verify_checkpoint(24201, &Hash::ZERO).is_ok());
        assert!(matches!(
            MAIN_NET.verify_checkpoint(24200, &Hash::ZERO),
            Err(ChainCfgError::CheckpointMismatch { height: 24200, .. })
        ));
    }

    #[test]
    fn verify_block_checks_genesis_on_every_network() {
        let other = Hash::double_sha256(b"not a genesis header");
        for params in [&MAIN_NET, &TEST_NET, &REGRESSION_NET] {
            assert!(params.verify_block(0, &params.genesis_hash).is_ok());
            assert_eq!(
                params.verify_block(0, &other),
                Err(ChainCfgError::GenesisMismatch {
                    expected: params.genesis_hash,
                    actual: other,
                })
            );
            assert!(params.verify_block(1, &other).is_ok());
        }
        assert!(matches!(
            MAIN_NET.verify_block(24200, &other),
            Err(ChainCfgError::CheckpointMismatch { .. })
        ));
    }

    #[test]
    fn data_dir_names() {
        assert_eq!(data_dir_name(&MAIN_NET), "xzc");
        assert_eq!(data_dir_name(&TEST_NET), "testnet");
        assert_eq!(data_dir_name(&REGRESSION_NET), "regtest");
    }

    #[test]
    fn network_names_parse() {
        assert_eq!("xzc".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!("simnet".parse::<Network>().is_err());
        let n: Network = serde_json::from_str("\"xzctest\"").unwrap();
        assert_eq!(n, Network::Testnet);
        assert_eq!(Network::Regtest.params().name, "regtest");
    }
}
