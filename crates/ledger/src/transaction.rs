use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use linkvend_core::{DomainError, DomainResult, ProductId, TransactionId, UserId};

/// Purchase transaction status lifecycle.
///
/// A row is created `Pending` and transitions exactly once, to `Approved` or
/// `Rejected`. It never reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }
}

/// The two terminal outcomes a moderator can drive a pending row to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Approved,
    Rejected,
}

impl Resolution {
    pub fn as_status(&self) -> TransactionStatus {
        match self {
            Resolution::Approved => TransactionStatus::Approved,
            Resolution::Rejected => TransactionStatus::Rejected,
        }
    }
}

/// One purchase attempt.
///
/// `product_name` and `price_charged` are snapshots taken at open time, so
/// later catalog or discount changes never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub price_charged: u64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// The purchase ledger.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Create a `Pending` row. Always succeeds.
    async fn open(
        &self,
        user_id: UserId,
        product_id: ProductId,
        product_name: &str,
        price_charged: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<Transaction>;

    async fn get(&self, transaction_id: TransactionId) -> DomainResult<Transaction>;

    /// Resolve a pending row, as a single claim-if-pending conditional
    /// update. Returns `Conflict` (row untouched) unless the current status
    /// is `Pending`; this is what guards against double-processing from
    /// concurrent or retried moderator actions.
    async fn transition(
        &self,
        transaction_id: TransactionId,
        resolution: Resolution,
    ) -> DomainResult<()>;
}

/// In-memory ledger for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    rows: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryLedger {
    async fn open(
        &self,
        user_id: UserId,
        product_id: ProductId,
        product_name: &str,
        price_charged: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<Transaction> {
        let transaction = Transaction {
            id: TransactionId::new(),
            user_id,
            product_id,
            product_name: product_name.to_string(),
            price_charged,
            status: TransactionStatus::Pending,
            created_at: at,
        };
        self.rows
            .write()
            .unwrap()
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn get(&self, transaction_id: TransactionId) -> DomainResult<Transaction> {
        self.rows
            .read()
            .unwrap()
            .get(&transaction_id)
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    async fn transition(
        &self,
        transaction_id: TransactionId,
        resolution: Resolution,
    ) -> DomainResult<()> {
        let mut rows = self.rows.write().unwrap();
        let row = rows.get_mut(&transaction_id).ok_or(DomainError::NotFound)?;
        if row.status != TransactionStatus::Pending {
            return Err(DomainError::conflict(format!(
                "transaction {transaction_id} already {}",
                row.status.as_str()
            )));
        }
        row.status = resolution.as_status();
        Ok(())
    }
}
