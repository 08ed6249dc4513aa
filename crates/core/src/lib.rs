//! Shared domain primitives.
//!
//! Strongly-typed identifiers and the error taxonomy used by every other
//! crate. No IO, no storage concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CodeId, LinkId, ProductId, TransactionId, UserId};
