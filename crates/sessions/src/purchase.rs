use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use linkvend_core::{DomainError, DomainResult, ProductId, TransactionId, UserId};

use crate::map::Expire;

/// Buyer conversation states.
///
/// ```text
/// SelectingProduct -> ConfirmingPurchase <-> AwaitingDiscountCode
///                          |
///                          v  (opens a pending ledger row)
///                     AwaitingReceipt -> terminal (session removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseState {
    SelectingProduct,
    ConfirmingPurchase,
    AwaitingDiscountCode,
    AwaitingReceipt,
}

/// Per-buyer purchase conversation.
///
/// Everything here is an ephemeral snapshot of the buyer's selections; the
/// ledger row opened at confirm time is the only durable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSession {
    pub user_id: UserId,
    pub state: PurchaseState,
    pub product_id: Option<ProductId>,
    pub product_name: Option<String>,
    /// Catalog price of the selected product.
    pub base_price: Option<u64>,
    /// Price after the applied discount, if any.
    pub final_price: Option<u64>,
    pub applied_code: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub last_active: DateTime<Utc>,
}

impl PurchaseSession {
    pub fn start(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            state: PurchaseState::SelectingProduct,
            product_id: None,
            product_name: None,
            base_price: None,
            final_price: None,
            applied_code: None,
            transaction_id: None,
            last_active: at,
        }
    }

    /// Pick (or re-pick) a product, moving to `ConfirmingPurchase`.
    ///
    /// Re-picking drops any applied discount: the discount was computed for
    /// the old price and a session applies a code at most once per selection.
    pub fn select(
        &mut self,
        product_id: ProductId,
        product_name: &str,
        price: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.state == PurchaseState::AwaitingReceipt {
            return Err(DomainError::conflict(
                "purchase already confirmed; awaiting receipt",
            ));
        }
        self.product_id = Some(product_id);
        self.product_name = Some(product_name.to_string());
        self.base_price = Some(price);
        self.final_price = None;
        self.applied_code = None;
        self.state = PurchaseState::ConfirmingPurchase;
        self.last_active = at;
        Ok(())
    }

    /// Ask for a discount code, moving to `AwaitingDiscountCode`.
    pub fn request_discount(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.state != PurchaseState::ConfirmingPurchase {
            return Err(DomainError::conflict("no product pending confirmation"));
        }
        self.state = PurchaseState::AwaitingDiscountCode;
        self.last_active = at;
        Ok(())
    }

    /// Whether a code was already applied this session.
    pub fn discount_applied(&self) -> bool {
        self.applied_code.is_some()
    }

    /// Record a successfully redeemed code and return to
    /// `ConfirmingPurchase`. The caller has already redeemed the code and
    /// computed the final price.
    pub fn apply_discount(
        &mut self,
        code: &str,
        final_price: u64,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_discountable()?;
        if self.discount_applied() {
            return Err(DomainError::conflict("discount code already applied"));
        }
        self.applied_code = Some(code.to_string());
        self.final_price = Some(final_price);
        self.state = PurchaseState::ConfirmingPurchase;
        self.last_active = at;
        Ok(())
    }

    /// A repeated apply attempt: no re-validation, no usage increment, the
    /// price stands. Returns to `ConfirmingPurchase` like a successful apply.
    pub fn note_already_applied(&mut self, at: DateTime<Utc>) -> DomainResult<u64> {
        self.ensure_discountable()?;
        if !self.discount_applied() {
            return Err(DomainError::conflict("no discount applied yet"));
        }
        self.state = PurchaseState::ConfirmingPurchase;
        self.last_active = at;
        Ok(self.effective_price())
    }

    /// The price the buyer will be charged: discounted if a code was
    /// applied, catalog price otherwise.
    pub fn effective_price(&self) -> u64 {
        self.final_price.or(self.base_price).unwrap_or(0)
    }

    /// Confirm payment intent: the caller has opened a pending ledger row;
    /// remember it and move to `AwaitingReceipt`.
    pub fn confirm(&mut self, transaction_id: TransactionId, at: DateTime<Utc>) -> DomainResult<()> {
        if self.state != PurchaseState::ConfirmingPurchase {
            return Err(DomainError::conflict("no product pending confirmation"));
        }
        self.transaction_id = Some(transaction_id);
        self.state = PurchaseState::AwaitingReceipt;
        self.last_active = at;
        Ok(())
    }

    fn ensure_discountable(&self) -> DomainResult<()> {
        match self.state {
            PurchaseState::ConfirmingPurchase | PurchaseState::AwaitingDiscountCode => Ok(()),
            _ => Err(DomainError::conflict("no product pending confirmation")),
        }
    }
}

impl Expire for PurchaseSession {
    fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn confirming() -> PurchaseSession {
        let mut session = PurchaseSession::start(UserId::new(42), now());
        session
            .select(ProductId::new(), "20 GB", 65_000, now())
            .unwrap();
        session
    }

    #[test]
    fn select_moves_to_confirming() {
        let session = confirming();
        assert_eq!(session.state, PurchaseState::ConfirmingPurchase);
        assert_eq!(session.effective_price(), 65_000);
    }

    #[test]
    fn discount_round_trip_returns_to_confirming() {
        let mut session = confirming();
        session.request_discount(now()).unwrap();
        assert_eq!(session.state, PurchaseState::AwaitingDiscountCode);

        session.apply_discount("PROMO1", 58_500, now()).unwrap();
        assert_eq!(session.state, PurchaseState::ConfirmingPurchase);
        assert_eq!(session.effective_price(), 58_500);
    }

    #[test]
    fn second_apply_is_rejected_and_price_stands() {
        let mut session = confirming();
        session.apply_discount("PROMO1", 58_500, now()).unwrap();

        let err = session.apply_discount("OTHER", 1, now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let price = session.note_already_applied(now()).unwrap();
        assert_eq!(price, 58_500);
        assert_eq!(session.state, PurchaseState::ConfirmingPurchase);
    }

    #[test]
    fn reselecting_a_product_drops_the_discount() {
        let mut session = confirming();
        session.apply_discount("PROMO1", 58_500, now()).unwrap();

        session
            .select(ProductId::new(), "50 GB", 120_000, now())
            .unwrap();
        assert!(!session.discount_applied());
        assert_eq!(session.effective_price(), 120_000);
    }

    #[test]
    fn confirm_moves_to_awaiting_receipt_and_locks_selection() {
        let mut session = confirming();
        let tx = TransactionId::new();
        session.confirm(tx, now()).unwrap();
        assert_eq!(session.state, PurchaseState::AwaitingReceipt);
        assert_eq!(session.transaction_id, Some(tx));

        let err = session
            .select(ProductId::new(), "x", 1, now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn cannot_confirm_before_selecting() {
        let mut session = PurchaseSession::start(UserId::new(1), now());
        let err = session.confirm(TransactionId::new(), now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
