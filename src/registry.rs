use crate::ledger::{Ledger, WalletAddress};
use crate::monitor::WalletMonitor;
use crate::network::NetworkSet;
use crate::notify::Notifier;
use crate::rpc::ChainReader;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Identity of one monitoring task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorKey {
    pub user_id: String,
    pub wallet: WalletAddress,
    pub network: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns every monitoring task handle. At most one live task exists per
/// (user, wallet, network) tuple, and only the registry may cancel one.
pub struct MonitorRegistry {
    ledger: Arc<Ledger>,
    notifier: Arc<Notifier>,
    readers: HashMap<String, Arc<dyn ChainReader>>,
    networks: NetworkSet,
    poll_interval: Duration,
    tasks: Mutex<HashMap<MonitorKey, MonitorHandle>>,
}

impl MonitorRegistry {
    pub fn new(
        ledger: Arc<Ledger>,
        notifier: Arc<Notifier>,
        readers: HashMap<String, Arc<dyn ChainReader>>,
        networks: NetworkSet,
        poll_interval: Duration,
    ) -> Self {
        MonitorRegistry {
            ledger,
            notifier,
            readers,
            networks,
            poll_interval,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn networks(&self) -> &NetworkSet {
        &self.networks
    }

    pub fn reader(&self, network: &str) -> Option<Arc<dyn ChainReader>> {
        self.readers.get(network).map(Arc::clone)
    }

    /// Spawn a monitor for the tuple unless one is already live. A task that
    /// has finished on its own does not block a restart.
    pub async fn start(
        &self,
        user_id: &str,
        wallet: WalletAddress,
        network: &str,
    ) -> Result<StartOutcome> {
        let descriptor = self
            .networks
            .get(network)
            .with_context(|| format!("Network {network} is not configured"))?
            .clone();
        let reader = self
            .reader(network)
            .with_context(|| format!("No chain reader for network {network}"))?;

        let key = MonitorKey {
            user_id: user_id.to_string(),
            wallet,
            network: network.to_string(),
        };

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(&key) {
            if !existing.task.is_finished() {
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = WalletMonitor::new(
            user_id.to_string(),
            wallet,
            descriptor,
            reader,
            Arc::clone(&self.ledger),
            Arc::clone(&self.notifier),
        );
        let task = tokio::spawn(monitor.run(self.poll_interval, stop_rx));

        tasks.insert(
            key,
            MonitorHandle {
                stop: stop_tx,
                task,
            },
        );
        Ok(StartOutcome::Started)
    }

    /// Signal one tuple's task to stop after its current tick, if any is
    /// registered. Safe to call while a tick is in flight.
    pub async fn stop(&self, user_id: &str, wallet: &WalletAddress, network: &str) -> bool {
        let key = MonitorKey {
            user_id: user_id.to_string(),
            wallet: *wallet,
            network: network.to_string(),
        };

        let mut tasks = self.tasks.lock().await;
        match tasks.remove(&key) {
            Some(handle) => {
                let _ = handle.stop.send(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every tuple belonging to a user. Returns how many were stopped.
    pub async fn stop_all(&self, user_id: &str) -> usize {
        let mut tasks = self.tasks.lock().await;
        let keys: Vec<MonitorKey> = tasks
            .keys()
            .filter(|key| key.user_id == user_id)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(handle) = tasks.remove(key) {
                let _ = handle.stop.send(true);
            }
        }

        if !keys.is_empty() {
            info!("Stopped {} monitor(s) for user {}", keys.len(), user_id);
        }
        keys.len()
    }

    /// Live task count for a user, ignoring tasks that already finished.
    pub async fn active_for_user(&self, user_id: &str) -> usize {
        let tasks = self.tasks.lock().await;
        tasks
            .iter()
            .filter(|(key, handle)| key.user_id == user_id && !handle.task.is_finished())
            .count()
    }
}
