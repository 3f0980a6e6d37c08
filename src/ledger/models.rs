use alloy_primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A tracked chain address. The byte form is canonical, so comparisons are
/// case-insensitive by construction; rendering is 0x-prefixed lower-case hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WalletAddress(Address);

impl WalletAddress {
    /// Parse a user-supplied address. Any hex casing is accepted.
    pub fn parse(input: &str) -> Option<Self> {
        Address::from_str(input.trim()).ok().map(WalletAddress)
    }

    pub fn as_address(&self) -> Address {
        self.0
    }
}

impl From<Address> for WalletAddress {
    fn from(address: Address) -> Self {
        WalletAddress(address)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

/// A normalized chain transaction as seen by one tracked wallet. The same
/// chain transaction observed for two tracked wallets yields two records.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    /// None for contract-creation transactions.
    pub to: Option<Address>,
    /// Value in the network's display unit (e.g. ether, not wei).
    pub value: Decimal,
    /// Fee in the network's display unit.
    pub fee: Decimal,
    pub network: String,
    /// Milliseconds since epoch. Block time when available, otherwise the
    /// moment of observation; not an ordering key across networks.
    pub timestamp_ms: i64,
    pub block_number: u64,
    pub direction: Direction,
    pub gas_used: u64,
    pub gas_price_gwei: Decimal,
    /// The tracked wallet this record belongs to.
    pub wallet: WalletAddress,
}

impl Transaction {
    pub fn dedup_key(&self) -> TxKey {
        TxKey {
            network: self.network.clone(),
            hash: self.hash,
            wallet: self.wallet,
            direction: self.direction,
        }
    }
}

/// Identity of a transaction record for re-observation detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxKey {
    pub network: String,
    pub hash: B256,
    pub wallet: WalletAddress,
    pub direction: Direction,
}

/// All per-user state. Created lazily on first interaction; process-local,
/// lost on restart.
#[derive(Debug, Default)]
pub struct UserAccount {
    pub wallets: Vec<WalletAddress>,
    /// Append-only, in arrival order. Consumers sort by timestamp.
    pub transactions: Vec<Transaction>,
    pub monitoring_active: bool,
    seen: HashSet<TxKey>,
    cursors: HashMap<(String, WalletAddress), u64>,
}

impl UserAccount {
    pub fn contains_wallet(&self, wallet: &WalletAddress) -> bool {
        self.wallets.contains(wallet)
    }

    pub fn has_transaction(&self, key: &TxKey) -> bool {
        self.seen.contains(key)
    }

    pub fn append_transaction(&mut self, tx: Transaction) {
        self.seen.insert(tx.dedup_key());
        self.transactions.push(tx);
    }

    pub fn cursor(&self, network: &str, wallet: &WalletAddress) -> Option<u64> {
        self.cursors.get(&(network.to_string(), *wallet)).copied()
    }

    pub fn set_cursor(&mut self, network: &str, wallet: &WalletAddress, height: u64) {
        self.cursors.insert((network.to_string(), *wallet), height);
    }
}
