//! `TransactionLedger` and `GrantStore` over their tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use linkvend_core::{DomainError, DomainResult, ProductId, TransactionId, UserId};
use linkvend_ledger::{
    AccessGrant, GrantStore, Resolution, Transaction, TransactionLedger, TransactionStatus,
};

use crate::store::{
    fmt_date, fmt_ts, is_unique_violation, parse_date, parse_id, parse_ts, storage_err, SqliteStore,
};

fn status_from_str(s: &str) -> DomainResult<TransactionStatus> {
    match s {
        "pending" => Ok(TransactionStatus::Pending),
        "approved" => Ok(TransactionStatus::Approved),
        "rejected" => Ok(TransactionStatus::Rejected),
        other => Err(DomainError::storage(format!("bad status {other:?}"))),
    }
}

fn transaction_from_row(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Transaction> {
    Ok(Transaction {
        id: parse_id(row.get::<&str, _>("id"))?,
        user_id: UserId::new(row.get::<i64, _>("user_id")),
        product_id: parse_id(row.get::<&str, _>("product_id"))?,
        product_name: row.get("product_name"),
        price_charged: row.get::<i64, _>("price_charged") as u64,
        status: status_from_str(row.get::<&str, _>("status"))?,
        created_at: parse_ts(row.get::<&str, _>("created_at"))?,
    })
}

#[async_trait]
impl TransactionLedger for SqliteStore {
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
        sqlx::query(
            "INSERT INTO transactions
                 (id, user_id, product_id, product_name, price_charged, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transaction.id.to_string())
        .bind(user_id.as_i64())
        .bind(product_id.to_string())
        .bind(product_name)
        .bind(price_charged as i64)
        .bind(transaction.status.as_str())
        .bind(fmt_ts(at))
        .execute(self.pool())
        .await
        .map_err(|e| storage_err("ledger.open", e))?;
        Ok(transaction)
    }

    async fn get(&self, transaction_id: TransactionId) -> DomainResult<Transaction> {
        let row = sqlx::query(
            "SELECT id, user_id, product_id, product_name, price_charged, status, created_at
             FROM transactions WHERE id = ?",
        )
        .bind(transaction_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage_err("ledger.get", e))?;
        match row {
            Some(row) => transaction_from_row(&row),
            None => Err(DomainError::NotFound),
        }
    }

    async fn transition(
        &self,
        transaction_id: TransactionId,
        resolution: Resolution,
    ) -> DomainResult<()> {
        // Claim-if-pending in one statement; zero rows means the claim lost.
        let result = sqlx::query(
            "UPDATE transactions SET status = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(resolution.as_status().as_str())
        .bind(transaction_id.to_string())
        .execute(self.pool())
        .await
        .map_err(|e| storage_err("ledger.transition", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        // Distinguish a missing row from an already-resolved one.
        let current = self.get(transaction_id).await?;
        Err(DomainError::conflict(format!(
            "transaction {transaction_id} already {}",
            current.status.as_str()
        )))
    }
}

#[async_trait]
impl GrantStore for SqliteStore {
    async fn record(&self, grant: AccessGrant) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO access_grants
                 (transaction_id, user_id, product_name, link, purchased_on, expires_on, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(grant.transaction_id.to_string())
        .bind(grant.user_id.as_i64())
        .bind(&grant.product_name)
        .bind(&grant.link)
        .bind(fmt_date(grant.purchased_on))
        .bind(fmt_date(grant.expires_on))
        .bind(grant.active as i64)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict(format!(
                    "transaction {} already granted",
                    grant.transaction_id
                ))
            } else {
                storage_err("grants.record", e)
            }
        })?;
        Ok(())
    }

    async fn for_user(&self, user_id: UserId) -> DomainResult<Vec<AccessGrant>> {
        let rows = sqlx::query(
            "SELECT transaction_id, user_id, product_name, link, purchased_on, expires_on, active
             FROM access_grants WHERE user_id = ? AND active = 1
             ORDER BY purchased_on, transaction_id",
        )
        .bind(user_id.as_i64())
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage_err("grants.for_user", e))?;
        rows.iter().map(grant_from_row).collect()
    }

    async fn for_transaction(&self, transaction_id: TransactionId) -> DomainResult<AccessGrant> {
        let row = sqlx::query(
            "SELECT transaction_id, user_id, product_name, link, purchased_on, expires_on, active
             FROM access_grants WHERE transaction_id = ?",
        )
        .bind(transaction_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage_err("grants.for_transaction", e))?;
        match row {
            Some(row) => grant_from_row(&row),
            None => Err(DomainError::NotFound),
        }
    }
}

fn grant_from_row(row: &sqlx::sqlite::SqliteRow) -> DomainResult<AccessGrant> {
    Ok(AccessGrant {
        user_id: UserId::new(row.get::<i64, _>("user_id")),
        transaction_id: parse_id(row.get::<&str, _>("transaction_id"))?,
        product_name: row.get("product_name"),
        link: row.get("link"),
        purchased_on: parse_date(row.get::<&str, _>("purchased_on"))?,
        expires_on: parse_date(row.get::<&str, _>("expires_on"))?,
        active: row.get::<i64, _>("active") != 0,
    })
}
