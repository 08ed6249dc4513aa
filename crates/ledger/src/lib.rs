//! Transaction ledger: one row per purchase attempt, plus the access grants
//! minted when a purchase is approved.

pub mod grant;
pub mod transaction;

pub use grant::{AccessGrant, GrantStore, InMemoryGrantStore};
pub use transaction::{
    InMemoryLedger, Resolution, Transaction, TransactionLedger, TransactionStatus,
};
