use crate::ledger::{Direction, Transaction, WalletAddress};
use crate::network::NetworkDescriptor;
use crate::rpc::{BlockData, ReceiptData, TxData};
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Convert a raw chain amount to the network's display unit, exactly. The
/// multiplication and the decimal shift both stay in integer/decimal-string
/// arithmetic; binary floating point is never involved.
pub(crate) fn to_display_units(amount: U256, decimals: u8) -> Result<Decimal> {
    let formatted = format_units(amount, decimals)
        .with_context(|| format!("Cannot format amount {amount} with {decimals} decimals"))?;
    Decimal::from_str(formatted.trim_end_matches('0').trim_end_matches('.'))
        .or_else(|_| Decimal::from_str(&formatted))
        .with_context(|| format!("Amount {formatted} does not fit a display decimal"))
}

/// Build a normalized Transaction record for one tracked wallet.
///
/// Fails when the raw data is missing required fields; the caller skips the
/// transaction and retries on a later poll, it never treats this as fatal.
pub fn classify(
    tx: &TxData,
    receipt: &ReceiptData,
    block: Option<&BlockData>,
    wallet: &WalletAddress,
    network: &NetworkDescriptor,
) -> Result<Transaction> {
    let direction = if tx.from == wallet.as_address() {
        Direction::Sent
    } else {
        Direction::Received
    };

    let gas_price = match receipt.effective_gas_price {
        0 => tx
            .gas_price
            .filter(|p| *p > 0)
            .context("Transaction has no usable gas price")?,
        price => price,
    };

    // Exact integer product in wei scale, converted once at the end.
    let fee_raw = U256::from(receipt.gas_used)
        .checked_mul(U256::from(gas_price))
        .context("Fee computation overflowed")?;
    let fee = to_display_units(fee_raw, network.decimals)?;
    let value = to_display_units(tx.value, network.decimals)?;
    let gas_price_gwei = to_display_units(U256::from(gas_price), 9)?;

    // Block time when we have it; otherwise the observation instant, which
    // approximates but does not equal confirmation time.
    let timestamp_ms = match block {
        Some(block) => block.timestamp_secs as i64 * 1000,
        None => Utc::now().timestamp_millis(),
    };

    Ok(Transaction {
        hash: tx.hash,
        from: tx.from,
        to: tx.to,
        value,
        fee,
        network: network.key.clone(),
        timestamp_ms,
        block_number: block.map(|b| b.number).unwrap_or_default(),
        direction,
        gas_used: receipt.gas_used,
        gas_price_gwei,
        wallet: *wallet,
    })
}
