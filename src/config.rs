use crate::network::{NetworkDescriptor, builtin_networks};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;
const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub enabled_networks: Vec<String>,
    /// Per-network RPC endpoints; more than one enables rotation.
    pub rpc_urls: HashMap<String, Vec<String>>,
    pub poll_interval: Duration,
    pub history_limit: usize,
    pub networks_file: Option<String>,
}

impl Config {
    /// Load from the environment. A missing RPC URL for an enabled network
    /// is fatal here, before any monitoring begins.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let enabled_networks: Vec<String> = std::env::var("NETWORKS")
            .unwrap_or_else(|_| "ethereum".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if enabled_networks.is_empty() {
            anyhow::bail!("NETWORKS must name at least one network");
        }

        let mut rpc_urls = HashMap::new();
        for key in &enabled_networks {
            let var = format!("{}_RPC_URLS", key.to_uppercase());
            let raw = std::env::var(&var)
                .with_context(|| format!("{var} must be set for network {key}"))?;
            let urls: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if urls.is_empty() {
                anyhow::bail!("{var} contains no usable URL");
            }
            rpc_urls.insert(key.clone(), urls);
        }

        let poll_interval_secs = match std::env::var("POLL_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .context("POLL_INTERVAL_SECS must be an integer number of seconds")?,
            Err(_) => DEFAULT_POLL_INTERVAL_SECS,
        };

        let history_limit = match std::env::var("HISTORY_LIMIT") {
            Ok(raw) => raw
                .parse::<usize>()
                .context("HISTORY_LIMIT must be an integer")?,
            Err(_) => DEFAULT_HISTORY_LIMIT,
        };

        Ok(Config {
            enabled_networks,
            rpc_urls,
            poll_interval: Duration::from_secs(poll_interval_secs),
            history_limit,
            networks_file: std::env::var("NETWORKS_FILE").ok(),
        })
    }

    /// The descriptor table: built-ins, optionally extended or overridden by
    /// a JSON file of descriptors.
    pub fn network_table(&self) -> Result<Vec<NetworkDescriptor>> {
        let mut table = builtin_networks();

        if let Some(path) = &self.networks_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read networks file {path}"))?;
            let extra: Vec<NetworkDescriptor> = serde_json::from_str(&raw)
                .with_context(|| format!("Networks file {path} is not valid JSON"))?;

            for descriptor in extra {
                match table.iter_mut().find(|n| n.key == descriptor.key) {
                    Some(existing) => *existing = descriptor,
                    None => table.push(descriptor),
                }
            }
        }

        Ok(table)
    }
}
