//! Link bank: the pool of single-use access links per product.

pub mod link;

pub use link::{InMemoryLinkBank, LinkBank, LinkRecord};
