use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use linkvend_core::{CodeId, DomainError, DomainResult};

/// How a discount reduces a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// Subtract `floor(price * value / 100)`.
    Percent,
    /// Subtract `value` currency units.
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percent => "percent",
            DiscountKind::Fixed => "fixed",
        }
    }
}

/// The redeemable part of a code, returned by a successful `redeem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountKind,
    pub value: u64,
}

/// A registered discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: CodeId,
    /// Normalized (trimmed, uppercased). Uniqueness is case-insensitive.
    pub code: String,
    pub kind: DiscountKind,
    pub value: u64,
    pub max_uses: u64,
    pub current_uses: u64,
    /// Inclusive: the code is still valid on this date.
    pub expires_on: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    pub fn discount(&self) -> Discount {
        Discount {
            kind: self.kind,
            value: self.value,
        }
    }
}

/// Canonical form of code text: trimmed and uppercased.
pub fn normalize_code(text: &str) -> String {
    text.trim().to_uppercase()
}

/// Price after applying a discount, clamped to 0.
pub fn discounted_price(price: u64, discount: Discount) -> u64 {
    match discount.kind {
        DiscountKind::Percent => {
            // Widen so a percent value over 100 cannot overflow the product.
            let cut = (u128::from(price) * u128::from(discount.value) / 100).min(u128::from(price));
            price - cut as u64
        }
        DiscountKind::Fixed => price.saturating_sub(discount.value),
    }
}

/// The registry of named discount codes.
#[async_trait]
pub trait DiscountRegistry: Send + Sync {
    /// Register a code. Returns `false` (and leaves the registry untouched)
    /// when the normalized text already exists.
    async fn create(
        &self,
        code: &str,
        kind: DiscountKind,
        value: u64,
        max_uses: u64,
        expires_on: Option<NaiveDate>,
        at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Redeem a code: normalize, check active/expiry/cap, and increment
    /// `current_uses`. The check and the increment are one indivisible
    /// operation, so concurrent redemptions can never push a code past its
    /// cap.
    ///
    /// `NotFound` for unknown text; `Invalid` for inactive, expired
    /// (`expires_on` strictly before `today`), or at-capacity codes.
    async fn redeem(&self, code_text: &str, today: NaiveDate) -> DomainResult<Discount>;

    /// Active, unexpired codes (admin view).
    async fn list(&self, today: NaiveDate) -> DomainResult<Vec<DiscountCode>>;
}

/// In-memory registry for tests/dev, keyed by normalized code text.
///
/// `redeem` does its check-and-increment under the write lock, making it
/// atomic with respect to other redemptions.
#[derive(Debug, Default)]
pub struct InMemoryDiscountRegistry {
    codes: RwLock<HashMap<String, DiscountCode>>,
}

impl InMemoryDiscountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a code by (any-case) text.
    pub fn get(&self, code_text: &str) -> Option<DiscountCode> {
        self.codes
            .read()
            .unwrap()
            .get(&normalize_code(code_text))
            .cloned()
    }
}

#[async_trait]
impl DiscountRegistry for InMemoryDiscountRegistry {
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
        let mut codes = self.codes.write().unwrap();
        if codes.contains_key(&normalized) {
            return Ok(false);
        }
        codes.insert(
            normalized.clone(),
            DiscountCode {
                id: CodeId::new(),
                code: normalized,
                kind,
                value,
                max_uses,
                current_uses: 0,
                expires_on,
                active: true,
                created_at: at,
            },
        );
        Ok(true)
    }

    async fn redeem(&self, code_text: &str, today: NaiveDate) -> DomainResult<Discount> {
        let normalized = normalize_code(code_text);
        let mut codes = self.codes.write().unwrap();
        let code = codes.get_mut(&normalized).ok_or(DomainError::NotFound)?;

        if !code.active {
            return Err(DomainError::invalid(format!("code {normalized} is inactive")));
        }
        if code.expires_on.is_some_and(|d| d < today) {
            return Err(DomainError::invalid(format!("code {normalized} has expired")));
        }
        if code.current_uses >= code.max_uses {
            return Err(DomainError::invalid(format!(
                "code {normalized} is at its usage cap"
            )));
        }

        code.current_uses += 1;
        Ok(code.discount())
    }

    async fn list(&self, today: NaiveDate) -> DomainResult<Vec<DiscountCode>> {
        let codes = self.codes.read().unwrap();
        let mut listed: Vec<_> = codes
            .values()
            .filter(|c| c.active && !c.expires_on.is_some_and(|d| d < today))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(listed)
    }
}
