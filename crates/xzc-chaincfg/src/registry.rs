use std::collections::{HashMap, HashSet};

use xzc_types::AddressKey;

use crate::error::{ChainCfgError, ChainCfgResult};
use crate::params::{Params, MAIN_NET, REGRESSION_NET, TEST_NET};

/// Set of networks a process knows about, keyed by magic and by name.
///
/// Also answers which address prefixes belong to any known network, which is
/// what an address parser needs before it knows the network.
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    by_net: HashMap<u32, Params>,
    names: HashMap<&'static str, u32>,
    pub_key_hash_addr_ids: HashSet<u8>,
    script_hash_addr_ids: HashSet<u8>,
    bech32_segwit_prefixes: HashSet<String>,
    hd_private_to_public: HashMap<[u8; 4], [u8; 4]>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the main, test, and regression networks.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for params in [&MAIN_NET, &TEST_NET, &REGRESSION_NET] {
            registry.insert(params.clone());
        }
        registry
    }

    /// Add a network. Fails if its magic or its name is already taken.
    pub fn register(&mut self, params: Params) -> ChainCfgResult<()> {
        if self.by_net.contains_key(&params.net) || self.names.contains_key(params.name) {
            return Err(ChainCfgError::DuplicateNet(params.name.to_string()));
        }
        self.insert(params);
        Ok(())
    }

    fn insert(&mut self, params: Params) {
        self.pub_key_hash_addr_ids.insert(params.pub_key_hash_addr_id);
        self.script_hash_addr_ids.insert(params.script_hash_addr_id);
        self.hd_private_to_public
            .insert(params.hd_private_key_id, params.hd_public_key_id);
        // A bech32 segwit address starts with the human-readable part and '1'.
        if !params.bech32_hrp_segwit.is_empty() {
            self.bech32_segwit_prefixes
                .insert(format!("{}1", params.bech32_hrp_segwit));
        }
        self.names.insert(params.name, params.net);
        self.by_net.insert(params.net, params);
    }

    /// Whether `id` prefixes pay-to-pubkey-hash addresses on any known
    /// network. An id may also be a script-hash prefix elsewhere.
    pub fn is_pub_key_hash_addr_id(&self, id: u8) -> bool {
        self.pub_key_hash_addr_ids.contains(&id)
    }

    /// Whether `id` prefixes pay-to-script-hash addresses on any known network.
    pub fn is_script_hash_addr_id(&self, id: u8) -> bool {
        self.script_hash_addr_ids.contains(&id)
    }

    /// Whether `prefix` (the human-readable part plus `1`, any case) starts
    /// segwit addresses on a known network.
    pub fn is_bech32_segwit_prefix(&self, prefix: &str) -> bool {
        self.bech32_segwit_prefixes.contains(&prefix.to_lowercase())
    }

    /// Public extended key id paired with a private extended key id.
    pub fn hd_private_key_to_public_key_id(&self, id: &[u8]) -> ChainCfgResult<[u8; 4]> {
        <[u8; 4]>::try_from(id)
            .ok()
            .and_then(|key| self.hd_private_to_public.get(&key).copied())
            .ok_or_else(|| ChainCfgError::UnknownHdKeyId(id.to_vec()))
    }

    /// Decode a base58 address for `params`, telling apart an address of
    /// another known network from one no network uses.
    pub fn decode_address(&self, params: &Params, address: &str) -> ChainCfgResult<AddressKey> {
        match params.decode_address(address) {
            Err(ChainCfgError::UnknownAddressVersion(version))
                if self.is_pub_key_hash_addr_id(version)
                    || self.is_script_hash_addr_id(version) =>
            {
                Err(ChainCfgError::AddressNetworkMismatch {
                    version,
                    network: params.name,
                })
            }
            other => other,
        }
    }

    pub fn by_net(&self, net: u32) -> Option<&Params> {
        self.by_net.get(&net)
    }

    pub fn by_name(&self, name: &str) -> Option<&Params> {
        self.names.get(name).and_then(|net| self.by_net.get(net))
    }

    pub fn len(&self) -> usize {
        self.by_net.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_net.is_empty()
    }
}
