use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use xzc_chaincfg::{data_dir_name, Network};
use xzc_db::StoreConfig;
use xzc_index::IndexConfig;

use crate::cli::Cli;

/// Everything `xzcdb` reads from its configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub network: Network,
    pub store: StoreConfig,
    pub index: IndexConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("xzcdata"),
            network: Network::default(),
            store: StoreConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// The config file named on the command line, if any, with flags applied
    /// on top.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dir) = &cli.datadir {
            config.data_dir = dir.clone();
        }
        if let Some(network) = cli.network {
            config.network = network;
        }
        config.index.tx_index |= cli.txindex;
        config.index.addr_index |= cli.addrindex;
        Ok(config)
    }

    /// Directory holding the selected network's store.
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(data_dir_name(self.network.params()))
    }
}
