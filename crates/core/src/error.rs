//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every core operation returns one of these as a typed outcome; the chat
/// transport maps them to user-facing text. Keep this focused on
/// deterministic business failures plus a single `Storage` escape hatch for
/// infrastructure faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (unknown product/transaction/code).
    #[error("not found")]
    NotFound,

    /// A conflicting update was refused (transaction already resolved,
    /// duplicate code text, no active session for the actor).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A finite pool had no unit left to hand out.
    #[error("exhausted: {0}")]
    Exhausted(String),

    /// A discount code exists but cannot be redeemed (inactive, expired,
    /// or at its usage cap).
    #[error("invalid: {0}")]
    Invalid(String),

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::Exhausted(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
