use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fs, path::PathBuf};

/// Simulation parameters, loaded from `~/.powsim/config.json` when the
/// file exists and created with defaults when it does not.
///
/// Times are milliseconds of simulated clock. `z0` / `z1` are the
/// fractions of peers with a slow network link / slow CPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub number_of_peers: usize,
    pub z0: f64,
    pub z1: f64,
    pub avg_txn_interval_time: f64,
    pub avg_block_mining_time: f64,
    pub target_num_blocks: usize,
    pub txn_per_block: usize,
    pub initial_coins: f64,
    pub save_results: bool,
    pub output_dir: String,
}

impl SimConfig {
    /// Total TXN_CREATE events the driver seeds.
    pub fn total_num_transactions(&self) -> usize {
        self.target_num_blocks * self.txn_per_block
    }

    pub fn txns_per_peer(&self) -> f64 {
        self.total_num_transactions() as f64 / self.number_of_peers as f64
    }

    /// Fewer spendable pending transactions than this defers a mining
    /// attempt.
    pub fn block_txns_min_threshold(&self) -> usize {
        self.txn_per_block.min(50)
    }

    /// Pending-transaction count that releases a deferred attempt.
    pub fn block_txns_trigger_threshold(&self) -> usize {
        self.txn_per_block
    }

    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().expect("Cannot find home directory");
        home.join(".powsim/config.json")
    }

    /// Output directory with tilde expansion applied.
    pub fn output_dir_resolved(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.output_dir);
        PathBuf::from(expanded.into_owned())
    }

    /// Load the configuration file; a missing file is replaced by a
    /// freshly saved default.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            log::info!("no configuration at {}, writing defaults", path.display());
            let cfg = Self::default();
            cfg.save()?;
            return Ok(cfg);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing configuration at {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating configuration directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("writing configuration to {}", path.display()))?;
        Ok(())
    }

    /// Rows for the parameter banner, derived values included.
    pub fn parameter_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("SAVE_RESULTS", self.save_results.to_string()),
            ("NUMBER_OF_PEERS", self.number_of_peers.to_string()),
            ("Z0", self.z0.to_string()),
            ("Z1", self.z1.to_string()),
            (
                "AVG_TXN_INTERVAL_TIME",
                self.avg_txn_interval_time.to_string(),
            ),
            (
                "AVG_BLOCK_MINING_TIME",
                self.avg_block_mining_time.to_string(),
            ),
            ("TARGET_NUM_BLOCKS", self.target_num_blocks.to_string()),
            ("TXN_PER_BLOCK", self.txn_per_block.to_string()),
            (
                "TOTAL_NUM_TRANSACTIONS",
                self.total_num_transactions().to_string(),
            ),
            ("TXNS_PER_PEER", self.txns_per_peer().to_string()),
            (
                "BLOCK_TXNS_MIN_THRESHOLD",
                self.block_txns_min_threshold().to_string(),
            ),
            (
                "BLOCK_TXNS_TRIGGER_THRESHOLD",
                self.block_txns_trigger_threshold().to_string(),
            ),
            ("INITIAL_COINS", self.initial_coins.to_string()),
            ("OUTPUT_DIR", self.output_dir.clone()),
        ]
    }

    /// Full parameter set as written to `config.json` next to exported
    /// results.
    pub fn export_json(&self) -> serde_json::Value {
        json!({
            "SAVE_RESULTS": self.save_results,
            "NUMBER_OF_PEERS": self.number_of_peers,
            "Z0": self.z0,
            "Z1": self.z1,
            "AVG_TXN_INTERVAL_TIME": self.avg_txn_interval_time,
            "AVG_BLOCK_MINING_TIME": self.avg_block_mining_time,
            "TARGET_NUM_BLOCKS": self.target_num_blocks,
            "TXN_PER_BLOCK": self.txn_per_block,
            "TOTAL_NUM_TRANSACTIONS": self.total_num_transactions(),
            "TXNS_PER_PEER": self.txns_per_peer(),
            "BLOCK_TXNS_MIN_THRESHOLD": self.block_txns_min_threshold(),
            "BLOCK_TXNS_TRIGGER_THRESHOLD": self.block_txns_trigger_threshold(),
            "INITIAL_COINS": self.initial_coins,
            "OUTPUT_DIR": self.output_dir,
        })
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            number_of_peers: 20,
            z0: 0.7,
            z1: 0.8,
            avg_txn_interval_time: 10_000.0,
            avg_block_mining_time: 1_000_000.0,
            target_num_blocks: 300,
            txn_per_block: 100,
            initial_coins: 1000.0,
            save_results: false,
            output_dir: "output".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_parameters() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.total_num_transactions(), 30_000);
        assert_eq!(cfg.block_txns_min_threshold(), 50);
        assert_eq!(cfg.block_txns_trigger_threshold(), 100);

        let small = SimConfig {
            txn_per_block: 10,
            ..SimConfig::default()
        };
        assert_eq!(small.block_txns_min_threshold(), 10);
    }

    #[test]
    fn export_covers_derived_values() {
        let cfg = SimConfig::default();
        let value = cfg.export_json();
        assert_eq!(value["TOTAL_NUM_TRANSACTIONS"], 30_000);
        assert_eq!(value["NUMBER_OF_PEERS"], 20);
    }
}
