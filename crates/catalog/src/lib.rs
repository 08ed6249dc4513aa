//! Product catalog (read-only reference data).

pub mod product;

pub use product::{Catalog, InMemoryCatalog, Product};
