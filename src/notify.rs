use crate::gateway::MessagingGateway;
use crate::ledger::{Direction, Transaction};
use crate::network::NetworkDescriptor;
use std::sync::Arc;
use tracing::warn;

/// Turns ledger records into chat text and pushes them out through the
/// gateway. A failed delivery is logged and dropped; the record is already
/// in the ledger by the time this runs, so no history is lost.
pub struct Notifier {
    gateway: Arc<dyn MessagingGateway>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Notifier { gateway }
    }

    pub async fn transaction_alert(
        &self,
        recipient: &str,
        tx: &Transaction,
        network: &NetworkDescriptor,
    ) {
        let text = format_transaction_alert(tx, network);
        if let Err(e) = self.gateway.send_text(recipient, &text).await {
            warn!(
                "Failed to deliver notification to {} for tx {}: {:#}",
                recipient, tx.hash, e
            );
        }
    }
}

pub fn format_transaction_alert(tx: &Transaction, network: &NetworkDescriptor) -> String {
    let counterparty = match tx.direction {
        Direction::Sent => match tx.to {
            Some(to) => format!("To: {to:#x}"),
            None => "To: (contract creation)".to_string(),
        },
        Direction::Received => format!("From: {:#x}", tx.from),
    };

    format!(
        "New {} transaction on {}\n\
         Wallet: {}\n\
         Amount: {:.6} {}\n\
         Fee: {:.6} {}\n\
         {}\n\
         Block: {}\n\
         {}",
        tx.direction,
        network.display_name,
        tx.wallet,
        tx.value,
        network.currency,
        tx.fee,
        network.currency,
        counterparty,
        tx.block_number,
        network.tx_url(&format!("{:#x}", tx.hash)),
    )
}
