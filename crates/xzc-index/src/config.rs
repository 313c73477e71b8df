use serde::{Deserialize, Serialize};

/// Which optional indexes to maintain and how to bring them up to date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maintain the transaction-by-hash index.
    pub tx_index: bool,
    /// Maintain the transaction-by-address index. Implies `tx_index`.
    pub addr_index: bool,
    /// Blocks connected per write transaction during startup catch-up.
    pub catch_up_batch_size: u32,
    /// Deepest orphaned branch an index is rolled back through before it is
    /// declared inconsistent with the main chain.
    pub max_reorg_depth: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tx_index: false,
            addr_index: false,
            catch_up_batch_size: 100,
            max_reorg_depth: 2016,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: IndexConfig = toml::from_str("addr_index = true").unwrap();
        assert!(cfg.addr_index);
        assert!(!cfg.tx_index);
        assert_eq!(cfg.catch_up_batch_size, 100);
        assert_eq!(cfg.max_reorg_depth, 2016);
    }
}
