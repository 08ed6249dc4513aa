use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use linkvend_core::{DomainError, DomainResult, ProductId};

/// A sellable product. Immutable reference data: the purchase flow reads it,
/// nothing in the core mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Price in smallest currency unit.
    pub price: u64,
    pub description: String,
}

impl Product {
    pub fn new(name: impl Into<String>, price: u64, description: impl Into<String>) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            description: description.into(),
        }
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All products, in catalog order.
    async fn list(&self) -> DomainResult<Vec<Product>>;

    /// A single product, or `NotFound`.
    async fn get(&self, product_id: ProductId) -> DomainResult<Product>;
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            products: RwLock::new(products),
        }
    }

    /// Seed one product (setup only; the catalog is read-only at runtime).
    pub fn insert(&self, product: Product) {
        self.products.write().unwrap().push(product);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list(&self) -> DomainResult<Vec<Product>> {
        Ok(self.products.read().unwrap().clone())
    }

    async fn get(&self, product_id: ProductId) -> DomainResult<Product> {
        self.products
            .read()
            .unwrap()
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
            .ok_or(DomainError::NotFound)
    }
}
