//! `DiscountRegistry` over the discount_codes table.
//!
//! `redeem` is a single guarded `UPDATE … SET current_uses = current_uses + 1`
//! so the cap check and the increment cannot interleave with a concurrent
//! redemption.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use linkvend_core::{CodeId, DomainError, DomainResult};
use linkvend_discounts::{normalize_code, Discount, DiscountCode, DiscountKind, DiscountRegistry};

use crate::store::{
    fmt_date, fmt_ts, is_unique_violation, parse_date, parse_id, parse_ts, storage_err, SqliteStore,
};

fn kind_from_str(s: &str) -> DomainResult<DiscountKind> {
    match s {
        "percent" => Ok(DiscountKind::Percent),
        "fixed" => Ok(DiscountKind::Fixed),
        other => Err(DomainError::storage(format!("bad discount kind {other:?}"))),
    }
}

fn code_from_row(row: &sqlx::sqlite::SqliteRow) -> DomainResult<DiscountCode> {
    let expires_on = row
        .get::<Option<&str>, _>("expires_on")
        .map(parse_date)
        .transpose()?;
    Ok(DiscountCode {
        id: parse_id(row.get::<&str, _>("id"))?,
        code: row.get("code"),
        kind: kind_from_str(row.get::<&str, _>("kind"))?,
        value: row.get::<i64, _>("value") as u64,
        max_uses: row.get::<i64, _>("max_uses") as u64,
        current_uses: row.get::<i64, _>("current_uses") as u64,
        expires_on,
        active: row.get::<i64, _>("active") != 0,
        created_at: parse_ts(row.get::<&str, _>("created_at"))?,
    })
}

#[async_trait]
impl DiscountRegistry for SqliteStore {
    async fn create(
        &self,
        code: &str,
        kind: DiscountKind,
        value: u64,
        max_uses: u64,
        expires_on: Option<NaiveDate>,
        at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let normalized = normalize_code(code);
        if normalized.is_empty() {
            return Err(DomainError::validation("discount code cannot be empty"));
        }
        let result = sqlx::query(
            "INSERT INTO discount_codes
                 (id, code, kind, value, max_uses, current_uses, expires_on, active, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, 1, ?)",
        )
        .bind(CodeId::new().to_string())
        .bind(&normalized)
        .bind(kind.as_str())
        .bind(value as i64)
        .bind(max_uses as i64)
        .bind(expires_on.map(fmt_date))
        .bind(fmt_ts(at))
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(storage_err("discounts.create", e)),
        }
    }

    async fn redeem(&self, code_text: &str, today: NaiveDate) -> DomainResult<Discount> {
        let normalized = normalize_code(code_text);
        // Check-and-increment in one statement. The dates compare as text:
        // both sides are YYYY-MM-DD.
        let row = sqlx::query(
            "UPDATE discount_codes
             SET current_uses = current_uses + 1
             WHERE code = ? AND active = 1 AND current_uses < max_uses
               AND (expires_on IS NULL OR expires_on >= ?)
             RETURNING kind, value",
        )
        .bind(&normalized)
        .bind(fmt_date(today))
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage_err("discounts.redeem", e))?;

        if let Some(row) = row {
            return Ok(Discount {
                kind: kind_from_str(row.get::<&str, _>("kind"))?,
                value: row.get::<i64, _>("value") as u64,
            });
        }

        // The guarded update did nothing; read the row to say why.
        let row = sqlx::query(
            "SELECT id, code, kind, value, max_uses, current_uses, expires_on, active, created_at
             FROM discount_codes WHERE code = ?",
        )
        .bind(&normalized)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage_err("discounts.redeem", e))?;
        let code = match row {
            Some(row) => code_from_row(&row)?,
            None => return Err(DomainError::NotFound),
        };
        if !code.active {
            Err(DomainError::invalid(format!("code {normalized} is inactive")))
        } else if code.expires_on.is_some_and(|d| d < today) {
            Err(DomainError::invalid(format!("code {normalized} has expired")))
        } else {
            Err(DomainError::invalid(format!(
                "code {normalized} is at its usage cap"
            )))
        }
    }

    async fn list(&self, today: NaiveDate) -> DomainResult<Vec<DiscountCode>> {
        let rows = sqlx::query(
            "SELECT id, code, kind, value, max_uses, current_uses, expires_on, active, created_at
             FROM discount_codes
             WHERE active = 1 AND (expires_on IS NULL OR expires_on >= ?)
             ORDER BY code",
        )
        .bind(fmt_date(today))
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage_err("discounts.list", e))?;
        rows.iter().map(code_from_row).collect()
    }
}
