//! The pool-owning store struct and shared row/column helpers.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use linkvend_catalog::Product;
use linkvend_core::{DomainError, DomainResult};

use crate::migrations;

/// SQLite-backed storage collaborator.
///
/// Owns its connection pool (no process-wide singleton); clone the handle to
/// share it. All trait implementations live in sibling modules.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a file-backed store.
    ///
    /// WAL journaling plus a busy timeout so concurrent writers queue instead
    /// of failing.
    pub async fn open(path: &Path) -> DomainResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("open", e))?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory store (tests/dev).
    ///
    /// Pinned to a single connection: each SQLite in-memory connection is its
    /// own database, so a larger pool would scatter the tables.
    pub async fn open_in_memory() -> DomainResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| storage_err("open", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("open", e))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> DomainResult<Self> {
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Seed one catalog product. Setup/admin path only; the catalog is
    /// read-only at runtime.
    pub async fn insert_product(&self, product: &Product) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO products (id, name, price, description) VALUES (?, ?, ?, ?)",
        )
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(product.price as i64)
        .bind(&product.description)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict(format!("product name {:?} already exists", product.name))
            } else {
                storage_err("insert_product", e)
            }
        })?;
        Ok(())
    }
}

pub(crate) fn storage_err(op: &str, e: sqlx::Error) -> DomainError {
    DomainError::storage(format!("{op}: {e}"))
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Timestamps are stored as fixed-width RFC 3339 TEXT (UTC, µs precision),
/// which also sorts lexicographically in `ORDER BY`.
pub(crate) fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DomainError::storage(format!("bad timestamp {s:?}: {e}")))
}

/// Dates are stored as `YYYY-MM-DD` TEXT; string comparison matches date
/// comparison, which the discount expiry predicate relies on.
pub(crate) fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(s: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DomainError::storage(format!("bad date {s:?}: {e}")))
}

pub(crate) fn parse_id<T>(s: &str) -> DomainResult<T>
where
    T: FromStr<Err = DomainError>,
{
    s.parse()
}
