//! Schema setup, applied on open.

use linkvend_core::DomainResult;
use sqlx::SqlitePool;

use crate::store::storage_err;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        price INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        product_name TEXT NOT NULL,
        price_charged INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS link_bank (
        id TEXT PRIMARY KEY,
        product_id TEXT NOT NULL,
        link TEXT NOT NULL UNIQUE,
        used INTEGER NOT NULL DEFAULT 0,
        assigned_user_id INTEGER,
        assigned_transaction_id TEXT,
        added_at TEXT NOT NULL,
        assigned_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_link_bank_unused
        ON link_bank (product_id, used)",
    "CREATE TABLE IF NOT EXISTS access_grants (
        transaction_id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        product_name TEXT NOT NULL,
        link TEXT NOT NULL,
        purchased_on TEXT NOT NULL,
        expires_on TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS discount_codes (
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        value INTEGER NOT NULL,
        max_uses INTEGER NOT NULL,
        current_uses INTEGER NOT NULL DEFAULT 0,
        expires_on TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )",
];

pub(crate) async fn run(pool: &SqlitePool) -> DomainResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| storage_err("migrate", e))?;
    }
    Ok(())
}
