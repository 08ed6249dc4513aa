//! `LinkBank` over the link_bank table.
//!
//! `allocate` is the correctness-critical operation: the claim is one
//! conditional `UPDATE … WHERE id = (oldest unused) AND used = 0 RETURNING`,
//! so two racing approvals can never be handed the same record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use linkvend_bank::{LinkBank, LinkRecord};
use linkvend_core::{DomainError, DomainResult, LinkId, ProductId, TransactionId, UserId};

use crate::store::{fmt_ts, parse_id, parse_ts, storage_err, SqliteStore};

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> DomainResult<LinkRecord> {
    let assigned_transaction_id = row
        .get::<Option<&str>, _>("assigned_transaction_id")
        .map(parse_id::<TransactionId>)
        .transpose()?;
    let assigned_at = row
        .get::<Option<&str>, _>("assigned_at")
        .map(parse_ts)
        .transpose()?;
    Ok(LinkRecord {
        id: parse_id(row.get::<&str, _>("id"))?,
        product_id: parse_id(row.get::<&str, _>("product_id"))?,
        link: row.get("link"),
        used: row.get::<i64, _>("used") != 0,
        assigned_user_id: row.get::<Option<i64>, _>("assigned_user_id").map(UserId::new),
        assigned_transaction_id,
        added_at: parse_ts(row.get::<&str, _>("added_at"))?,
        assigned_at,
    })
}

#[async_trait]
impl LinkBank for SqliteStore {
    async fn allocate(
        &self,
        product_id: ProductId,
        user_id: UserId,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> DomainResult<LinkRecord> {
        // Oldest-added-first; UUIDv7 id is a stable tiebreak within one
        // timestamp. The inner select and the guarded update are a single
        // statement, hence atomic.
        let row = sqlx::query(
            "UPDATE link_bank
             SET used = 1, assigned_user_id = ?, assigned_transaction_id = ?, assigned_at = ?
             WHERE id = (
                 SELECT id FROM link_bank
                 WHERE product_id = ? AND used = 0
                 ORDER BY added_at, id
                 LIMIT 1
             ) AND used = 0
             RETURNING id, product_id, link, used,
                       assigned_user_id, assigned_transaction_id, added_at, assigned_at",
        )
        .bind(user_id.as_i64())
        .bind(transaction_id.to_string())
        .bind(fmt_ts(at))
        .bind(product_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage_err("bank.allocate", e))?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(DomainError::exhausted(format!(
                "no unused link for product {product_id}"
            ))),
        }
    }

    async fn add_bulk(
        &self,
        product_id: ProductId,
        links: &[String],
        at: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let mut added = 0u64;
        for link in links {
            let link = link.trim();
            if link.is_empty() {
                continue;
            }
            // OR IGNORE: collisions with the global UNIQUE(link) constraint
            // are skipped, not errors.
            let result = sqlx::query(
                "INSERT OR IGNORE INTO link_bank (id, product_id, link, added_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(LinkId::new().to_string())
            .bind(product_id.to_string())
            .bind(link)
            .bind(fmt_ts(at))
            .execute(self.pool())
            .await
            .map_err(|e| storage_err("bank.add_bulk", e))?;
            added += result.rows_affected();
        }
        Ok(added)
    }

    async fn unused_counts(&self) -> DomainResult<HashMap<ProductId, u64>> {
        let rows = sqlx::query(
            "SELECT product_id, COUNT(*) AS remaining
             FROM link_bank WHERE used = 0 GROUP BY product_id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage_err("bank.unused_counts", e))?;

        let mut counts = HashMap::new();
        for row in rows {
            let product_id: ProductId = parse_id(row.get::<&str, _>("product_id"))?;
            counts.insert(product_id, row.get::<i64, _>("remaining") as u64);
        }
        Ok(counts)
    }
}
