use crate::classifier::to_display_units;
use crate::ledger::{AddWalletOutcome, Ledger, Transaction};
use crate::network::NetworkDescriptor;
use crate::registry::{MonitorRegistry, StartOutcome};
use crate::stats::{StatsWindow, aggregate};
use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

/// Everything the command dispatcher needs. Cheap to clone into handlers.
pub struct App {
    pub ledger: Arc<Ledger>,
    pub registry: Arc<MonitorRegistry>,
    pub history_limit: usize,
}

/// Map one inbound text command to core calls and produce the reply text.
pub async fn dispatch(app: &App, sender: &str, text: &str) -> String {
    let text = text.trim();
    let (command, rest) = match text.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (text, ""),
    };

    match command.to_lowercase().as_str() {
        "/add" => cmd_add_wallet(app, sender, rest).await,
        "/wallets" => cmd_wallets(app, sender).await,
        "/balance" => cmd_balance(app, sender).await,
        "/stats" => cmd_stats(app, sender, rest).await,
        "/history" => cmd_history(app, sender).await,
        "/stop" => cmd_stop(app, sender).await,
        "/help" | "/start" => help_text(),
        _ => format!("Unknown command.\n\n{}", help_text()),
    }
}

pub async fn cmd_add_wallet(app: &App, sender: &str, address: &str) -> String {
    if address.is_empty() {
        return "Usage: /add <address>".to_string();
    }

    match app.ledger.add_wallet(sender, address).await {
        AddWalletOutcome::InvalidAddress => {
            format!("{address} is not a valid address.")
        }
        AddWalletOutcome::AlreadyTracked => {
            "That wallet is already being tracked.".to_string()
        }
        AddWalletOutcome::Added(wallet) => {
            let mut started = 0usize;
            for descriptor in app.registry.networks().iter() {
                match app.registry.start(sender, wallet, &descriptor.key).await {
                    Ok(StartOutcome::Started) => started += 1,
                    Ok(StartOutcome::AlreadyRunning) => {}
                    Err(e) => warn!(
                        "Could not start monitor on {} for {}: {:#}",
                        descriptor.key, wallet, e
                    ),
                }
            }
            app.ledger.set_monitoring(sender, true).await;
            format!(
                "Now tracking {wallet}.\nMonitoring started on {started} network(s)."
            )
        }
    }
}

pub async fn cmd_wallets(app: &App, sender: &str) -> String {
    let wallets = app.ledger.wallets(sender).await;
    if wallets.is_empty() {
        return "No wallets tracked yet. Add one with /add <address>.".to_string();
    }

    let active = app.registry.active_for_user(sender).await;
    let mut lines = vec![format!(
        "Tracked wallets ({}), {} active monitor(s):",
        wallets.len(),
        active
    )];
    for wallet in wallets {
        lines.push(format!("  {wallet}"));
    }
    lines.join("\n")
}

pub async fn cmd_balance(app: &App, sender: &str) -> String {
    let wallets = app.ledger.wallets(sender).await;
    if wallets.is_empty() {
        return "No wallets tracked yet. Add one with /add <address>.".to_string();
    }

    let mut lines = Vec::new();
    for wallet in wallets {
        lines.push(format!("{wallet}"));

        let networks: Vec<&NetworkDescriptor> = app.registry.networks().iter().collect();
        let fetches = networks.iter().map(|descriptor| async move {
            match app.registry.reader(&descriptor.key) {
                Some(reader) => reader.native_balance(wallet.as_address()).await,
                None => Err(anyhow::anyhow!("no reader configured")),
            }
        });

        for (descriptor, result) in networks.iter().zip(join_all(fetches).await) {
            let line = match result.and_then(|raw| to_display_units(raw, descriptor.decimals)) {
                Ok(balance) => format!(
                    "  {}: {:.6} {}",
                    descriptor.display_name, balance, descriptor.currency
                ),
                Err(e) => {
                    warn!(
                        "Balance fetch failed on {} for {}: {:#}",
                        descriptor.key, wallet, e
                    );
                    format!("  {}: unavailable", descriptor.display_name)
                }
            };
            lines.push(line);
        }
    }
    lines.join("\n")
}

pub async fn cmd_stats(app: &App, sender: &str, period: &str) -> String {
    let Some(window) = StatsWindow::parse(period) else {
        return "Usage: /stats <today|week|month|year|month name>".to_string();
    };

    let transactions = app.ledger.transactions(sender).await;
    match aggregate(&transactions, &window, Local::now()) {
        Ok(summary) => format!(
            "Stats ({})\n\
             Transactions: {}\n\
             Received: {:.6}\n\
             Sent: {:.6}\n\
             Fees: {:.6}\n\
             Net change: {:.6}",
            summary.period,
            summary.count,
            summary.total_received,
            summary.total_sent,
            summary.total_fees,
            summary.net_change
        ),
        Err(e) => {
            warn!("Stats aggregation failed for {}: {:#}", sender, e);
            "Could not compute stats for that period.".to_string()
        }
    }
}

pub async fn cmd_history(app: &App, sender: &str) -> String {
    let mut transactions = app.ledger.transactions(sender).await;
    if transactions.is_empty() {
        return "No transactions recorded yet.".to_string();
    }

    // Arrival order is not time order across networks; sort before display.
    transactions.sort_by_key(|tx| std::cmp::Reverse(tx.timestamp_ms));
    transactions.truncate(app.history_limit);

    let mut lines = vec![format!("Last {} transaction(s):", transactions.len())];
    for tx in &transactions {
        lines.push(format_history_line(app, tx));
    }
    lines.join("\n")
}

fn format_history_line(app: &App, tx: &Transaction) -> String {
    let (currency, link) = match app.registry.networks().get(&tx.network) {
        Some(descriptor) => (
            descriptor.currency.clone(),
            descriptor.tx_url(&format!("{:#x}", tx.hash)),
        ),
        None => (tx.network.clone(), format!("{:#x}", tx.hash)),
    };

    let when = DateTime::<Utc>::from_timestamp_millis(tx.timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown time".to_string());

    format!(
        "  [{}] {:.6} {} on {} at {}\n    {}",
        tx.direction, tx.value, currency, tx.network, when, link
    )
}

pub async fn cmd_stop(app: &App, sender: &str) -> String {
    let stopped = app.registry.stop_all(sender).await;
    app.ledger.set_monitoring(sender, false).await;
    if stopped == 0 {
        "No active monitors.".to_string()
    } else {
        format!("Stopped {stopped} monitor(s).")
    }
}

pub fn help_text() -> String {
    "Commands:\n\
     /add <address> - track a wallet and start monitoring\n\
     /wallets - list tracked wallets\n\
     /balance - current native balance per network\n\
     /stats <period> - today, week, month, year or a month name\n\
     /history - recent transactions\n\
     /stop - stop all monitoring\n\
     /help - this text"
        .to_string()
}
