use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static per-chain configuration. Built once at startup, read-only after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub key: String,
    pub display_name: String,
    pub currency: String,
    pub explorer_tx_url: String,
    pub chain_id: u64,
    pub decimals: u8,
}

impl NetworkDescriptor {
    pub fn tx_url(&self, hash: &str) -> String {
        self.explorer_tx_url.replace("{hash}", hash)
    }
}

pub fn builtin_networks() -> Vec<NetworkDescriptor> {
    let table = [
        (
            "ethereum",
            "Ethereum",
            "ETH",
            "https://etherscan.io/tx/{hash}",
            1u64,
        ),
        (
            "polygon",
            "Polygon",
            "POL",
            "https://polygonscan.com/tx/{hash}",
            137,
        ),
        (
            "bsc",
            "BNB Smart Chain",
            "BNB",
            "https://bscscan.com/tx/{hash}",
            56,
        ),
        ("base", "Base", "ETH", "https://basescan.org/tx/{hash}", 8453),
        (
            "arbitrum",
            "Arbitrum One",
            "ETH",
            "https://arbiscan.io/tx/{hash}",
            42161,
        ),
    ];

    table
        .into_iter()
        .map(|(key, name, currency, explorer, chain_id)| NetworkDescriptor {
            key: key.to_string(),
            display_name: name.to_string(),
            currency: currency.to_string(),
            explorer_tx_url: explorer.to_string(),
            chain_id,
            decimals: 18,
        })
        .collect()
}

/// The set of networks this process monitors, keyed by network key.
#[derive(Debug, Clone)]
pub struct NetworkSet {
    networks: HashMap<String, NetworkDescriptor>,
}

impl NetworkSet {
    /// Resolve the enabled network keys against the descriptor table.
    /// Unknown keys are a configuration error and fatal at startup.
    pub fn from_keys(enabled: &[String], table: Vec<NetworkDescriptor>) -> Result<Self> {
        let mut by_key: HashMap<String, NetworkDescriptor> =
            table.into_iter().map(|n| (n.key.clone(), n)).collect();

        let mut networks = HashMap::new();
        for key in enabled {
            let descriptor = by_key
                .remove(key)
                .with_context(|| format!("Unknown network key: {key}"))?;
            networks.insert(key.clone(), descriptor);
        }

        Ok(NetworkSet { networks })
    }

    pub fn get(&self, key: &str) -> Option<&NetworkDescriptor> {
        self.networks.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkDescriptor> {
        self.networks.values()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
