//! `Catalog` over the products table.

use async_trait::async_trait;
use sqlx::Row;

use linkvend_catalog::{Catalog, Product};
use linkvend_core::{DomainError, DomainResult, ProductId};

use crate::store::{parse_id, storage_err, SqliteStore};

fn product_from_row(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Product> {
    Ok(Product {
        id: parse_id(row.get::<&str, _>("id"))?,
        name: row.get("name"),
        price: row.get::<i64, _>("price") as u64,
        description: row.get("description"),
    })
}

#[async_trait]
impl Catalog for SqliteStore {
    async fn list(&self) -> DomainResult<Vec<Product>> {
        // UUIDv7 ids are time-ordered, so this is insertion order.
        let rows = sqlx::query("SELECT id, name, price, description FROM products ORDER BY id")
            .fetch_all(self.pool())
            .await
            .map_err(|e| storage_err("catalog.list", e))?;
        rows.iter().map(product_from_row).collect()
    }

    async fn get(&self, product_id: ProductId) -> DomainResult<Product> {
        let row = sqlx::query("SELECT id, name, price, description FROM products WHERE id = ?")
            .bind(product_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| storage_err("catalog.get", e))?;
        match row {
            Some(row) => product_from_row(&row),
            None => Err(DomainError::NotFound),
        }
    }
}
