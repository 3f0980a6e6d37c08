use super::models::{Transaction, TxKey, UserAccount, WalletAddress};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Outcome of tracking a new wallet. The non-success variants are
/// informational, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddWalletOutcome {
    Added(WalletAddress),
    AlreadyTracked,
    InvalidAddress,
}

/// Owner of all per-user wallet and transaction state. Accounts are guarded
/// individually so monitors of different users never contend with each other;
/// the outer map lock is held only long enough to hand out the account handle.
#[derive(Default)]
pub struct Ledger {
    accounts: RwLock<HashMap<String, Arc<Mutex<UserAccount>>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Idempotent: the same user id always resolves to the same account.
    pub async fn account(&self, user_id: &str) -> Arc<Mutex<UserAccount>> {
        {
            let accounts = self.accounts.read().await;
            if let Some(account) = accounts.get(user_id) {
                return Arc::clone(account);
            }
        }

        let mut accounts = self.accounts.write().await;
        Arc::clone(
            accounts
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(UserAccount::default()))),
        )
    }

    /// Validate, normalize and store a wallet address for a user.
    pub async fn add_wallet(&self, user_id: &str, input: &str) -> AddWalletOutcome {
        let Some(wallet) = WalletAddress::parse(input) else {
            return AddWalletOutcome::InvalidAddress;
        };

        let account = self.account(user_id).await;
        let mut account = account.lock().await;
        if account.contains_wallet(&wallet) {
            return AddWalletOutcome::AlreadyTracked;
        }
        account.wallets.push(wallet);
        AddWalletOutcome::Added(wallet)
    }

    pub async fn wallets(&self, user_id: &str) -> Vec<WalletAddress> {
        let account = self.account(user_id).await;
        let account = account.lock().await;
        account.wallets.clone()
    }

    /// Append without any dedup check; callers decide the dedup policy.
    pub async fn append_transaction(&self, user_id: &str, tx: Transaction) {
        let account = self.account(user_id).await;
        let mut account = account.lock().await;
        account.append_transaction(tx);
    }

    pub async fn has_transaction(&self, user_id: &str, key: &TxKey) -> bool {
        let account = self.account(user_id).await;
        let account = account.lock().await;
        account.has_transaction(key)
    }

    pub async fn transactions(&self, user_id: &str) -> Vec<Transaction> {
        let account = self.account(user_id).await;
        let account = account.lock().await;
        account.transactions.clone()
    }

    pub async fn cursor(&self, user_id: &str, network: &str, wallet: &WalletAddress) -> Option<u64> {
        let account = self.account(user_id).await;
        let account = account.lock().await;
        account.cursor(network, wallet)
    }

    pub async fn set_cursor(&self, user_id: &str, network: &str, wallet: &WalletAddress, height: u64) {
        let account = self.account(user_id).await;
        let mut account = account.lock().await;
        account.set_cursor(network, wallet, height);
    }

    pub async fn set_monitoring(&self, user_id: &str, active: bool) {
        let account = self.account(user_id).await;
        let mut account = account.lock().await;
        account.monitoring_active = active;
    }

    pub async fn monitoring_active(&self, user_id: &str) -> bool {
        let account = self.account(user_id).await;
        let account = account.lock().await;
        account.monitoring_active
    }
}
