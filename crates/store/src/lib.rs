//! SQLite-backed storage for the fulfillment core.
//!
//! One [`SqliteStore`] owns the connection pool and implements every storage
//! trait (`Catalog`, `LinkBank`, `TransactionLedger`, `GrantStore`,
//! `DiscountRegistry`). The operations that need per-row mutual exclusion
//! (claim-if-unused, claim-if-pending, check-and-increment) are each a single
//! conditional `UPDATE … WHERE <precondition>`, never a read followed by a
//! write, so racing callers lose at the database instead of corrupting state.

mod bank;
mod catalog;
mod discounts;
mod ledger;
mod migrations;
mod store;

pub use store::SqliteStore;
