pub mod models;
pub mod store;

pub use models::{Direction, Transaction, TxKey, UserAccount, WalletAddress};
pub use store::{AddWalletOutcome, Ledger};
