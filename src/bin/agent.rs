use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use wallet_sentinel::commands::{self, App};
use wallet_sentinel::config::Config;
use wallet_sentinel::gateway::{ConsoleGateway, InboundMessage, MessagingGateway};
use wallet_sentinel::ledger::Ledger;
use wallet_sentinel::network::NetworkSet;
use wallet_sentinel::notify::Notifier;
use wallet_sentinel::registry::MonitorRegistry;
use wallet_sentinel::rpc::{ChainReader, RpcClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    info!("Starting wallet monitoring agent");

    let config = Config::from_env()?;
    let networks = NetworkSet::from_keys(&config.enabled_networks, config.network_table()?)?;
    info!("Configuration loaded: {} network(s)", networks.len());

    let mut readers: HashMap<String, Arc<dyn ChainReader>> = HashMap::new();
    for descriptor in networks.iter() {
        let urls = config
            .rpc_urls
            .get(&descriptor.key)
            .with_context(|| format!("No RPC URLs for network {}", descriptor.key))?;
        let client = RpcClient::new(urls)?;
        info!(
            "[{}] RPC client ready ({} endpoint(s))",
            descriptor.key,
            urls.len()
        );
        readers.insert(descriptor.key.clone(), Arc::new(client));
    }

    let ledger = Arc::new(Ledger::new());
    let gateway: Arc<dyn MessagingGateway> = Arc::new(ConsoleGateway);
    let notifier = Arc::new(Notifier::new(Arc::clone(&gateway)));
    let registry = Arc::new(MonitorRegistry::new(
        Arc::clone(&ledger),
        notifier,
        readers,
        networks,
        config.poll_interval,
    ));

    let app = App {
        ledger,
        registry,
        history_limit: config.history_limit,
    };

    info!("Agent ready; reading commands from stdin (sender: local)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let inbound = InboundMessage {
            sender: "local".to_string(),
            text: line.to_string(),
        };
        let reply = commands::dispatch(&app, &inbound.sender, &inbound.text).await;
        if let Err(e) = gateway.send_text(&inbound.sender, &reply).await {
            warn!("Failed to send reply: {:#}", e);
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}
