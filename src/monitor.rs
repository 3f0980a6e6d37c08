use crate::classifier::classify;
use crate::ledger::{Ledger, WalletAddress};
use crate::network::NetworkDescriptor;
use crate::notify::Notifier;
use crate::rpc::{BlockData, ChainReader};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Polling loop for one (user, wallet, network) tuple.
///
/// Each pass reads the chain head, walks blocks from the cursor upward and
/// records matching transactions. The cursor only advances past a block once
/// every matching transaction in it has been handled, so a mid-block failure
/// re-processes that block on the next pass instead of skipping it.
pub struct WalletMonitor {
    user_id: String,
    wallet: WalletAddress,
    network: NetworkDescriptor,
    reader: Arc<dyn ChainReader>,
    ledger: Arc<Ledger>,
    notifier: Arc<Notifier>,
}

impl WalletMonitor {
    pub fn new(
        user_id: String,
        wallet: WalletAddress,
        network: NetworkDescriptor,
        reader: Arc<dyn ChainReader>,
        ledger: Arc<Ledger>,
        notifier: Arc<Notifier>,
    ) -> Self {
        WalletMonitor {
            user_id,
            wallet,
            network,
            reader,
            ledger,
            notifier,
        }
    }

    /// Tick until stopped. Cancellation is observed between ticks only; an
    /// in-flight tick always runs to completion or aborts on its own error.
    pub async fn run(self, poll_interval: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "[{}] Monitoring {} for user {}",
            self.network.key, self.wallet, self.user_id
        );

        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    if let Err(e) = self.tick().await {
                        warn!(
                            "[{}] Poll failed for {} (user {}): {:#}",
                            self.network.key, self.wallet, self.user_id, e
                        );
                    }
                }
            }
        }

        info!(
            "[{}] Stopped monitoring {} for user {}",
            self.network.key, self.wallet, self.user_id
        );
    }

    /// One polling pass. Transient chain-read errors propagate out of here
    /// without advancing the cursor past the last fully-processed block; the
    /// next pass retries from there.
    pub async fn tick(&self) -> Result<()> {
        let head = self.reader.current_block_height().await?;

        let cursor = self
            .ledger
            .cursor(&self.user_id, &self.network.key, &self.wallet)
            .await;
        let Some(cursor) = cursor else {
            // First contact: monitoring begins from "now", not from history.
            self.ledger
                .set_cursor(&self.user_id, &self.network.key, &self.wallet, head)
                .await;
            info!(
                "[{}] Cursor for {} initialized at block {}",
                self.network.key, self.wallet, head
            );
            return Ok(());
        };

        if head <= cursor {
            // Chain has not advanced; normal, not an error.
            return Ok(());
        }

        for height in (cursor + 1)..=head {
            self.process_block(height).await?;
            self.ledger
                .set_cursor(&self.user_id, &self.network.key, &self.wallet, height)
                .await;
        }

        Ok(())
    }

    async fn process_block(&self, height: u64) -> Result<()> {
        let block = self
            .reader
            .block_with_transactions(height)
            .await?
            .with_context(|| format!("Block {height} not available yet"))?;

        let tracked = self.wallet.as_address();
        for tx in &block.transactions {
            if tx.from != tracked && tx.to != Some(tracked) {
                continue;
            }
            self.handle_match(tx, &block).await?;
        }

        Ok(())
    }

    async fn handle_match(&self, tx: &crate::rpc::TxData, block: &BlockData) -> Result<()> {
        // A missing receipt means the node is behind; abort the pass so this
        // block is revisited instead of silently dropping the transaction.
        let receipt = self
            .reader
            .transaction_receipt(tx.hash)
            .await?
            .with_context(|| format!("Receipt for {} not available yet", tx.hash))?;

        let record = match classify(tx, &receipt, Some(block), &self.wallet, &self.network) {
            Ok(record) => record,
            Err(e) => {
                // Malformed data: skip this transaction, keep the block.
                warn!(
                    "[{}] Skipping malformed transaction {}: {:#}",
                    self.network.key, tx.hash, e
                );
                return Ok(());
            }
        };

        let key = record.dedup_key();
        if self.ledger.has_transaction(&self.user_id, &key).await {
            debug!(
                "[{}] Transaction {} already recorded for {}, skipping",
                self.network.key, tx.hash, self.wallet
            );
            return Ok(());
        }

        info!(
            "[{}] {} {:.6} {} in block {} for {}",
            self.network.key,
            record.direction,
            record.value,
            self.network.currency,
            record.block_number,
            self.wallet
        );

        // The ledger append comes first; a failed notification must never
        // lose history.
        self.ledger
            .append_transaction(&self.user_id, record.clone())
            .await;
        self.notifier
            .transaction_alert(&self.user_id, &record, &self.network)
            .await;

        Ok(())
    }
}
