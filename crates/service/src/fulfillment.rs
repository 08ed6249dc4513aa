use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use linkvend_bank::LinkBank;
use linkvend_catalog::{Catalog, Product};
use linkvend_core::{DomainError, DomainResult, ProductId, TransactionId, UserId};
use linkvend_discounts::{discounted_price, normalize_code, DiscountCode, DiscountKind, DiscountRegistry};
use linkvend_ledger::{AccessGrant, GrantStore, Resolution, TransactionLedger, TransactionStatus};
use linkvend_sessions::{ModerationSession, PurchaseSession, PurchaseState, SessionMap};

use crate::config::FulfillmentConfig;
use crate::events::{EventSink, OutboundEvent};

/// Outcome of applying a discount code to a purchase session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountApplication {
    /// The code was redeemed and the price lowered.
    Applied { final_price: u64 },
    /// The session already carries a code; nothing was redeemed and the
    /// price stands.
    AlreadyApplied { final_price: u64 },
}

impl DiscountApplication {
    pub fn final_price(&self) -> u64 {
        match self {
            DiscountApplication::Applied { final_price }
            | DiscountApplication::AlreadyApplied { final_price } => *final_price,
        }
    }
}

/// What the buyer owes after confirming, keyed by the ledger row that
/// tracks the purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub transaction_id: TransactionId,
    pub product_name: String,
    pub amount_due: u64,
}

/// Remaining unused links for one catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub product_name: String,
    pub remaining: u64,
}

/// The fulfillment service.
///
/// One instance per process; every inbound operation goes through here.
/// Durable state lives behind the store traits, conversation state in the
/// two session maps, and every externally visible outcome is emitted on
/// the [`EventSink`] after the state change that backs it has committed.
pub struct Fulfillment {
    catalog: Arc<dyn Catalog>,
    bank: Arc<dyn LinkBank>,
    ledger: Arc<dyn TransactionLedger>,
    grants: Arc<dyn GrantStore>,
    discounts: Arc<dyn DiscountRegistry>,
    sink: Arc<dyn EventSink>,
    purchases: SessionMap<PurchaseSession>,
    moderations: SessionMap<ModerationSession>,
    config: FulfillmentConfig,
}

impl Fulfillment {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        bank: Arc<dyn LinkBank>,
        ledger: Arc<dyn TransactionLedger>,
        grants: Arc<dyn GrantStore>,
        discounts: Arc<dyn DiscountRegistry>,
        sink: Arc<dyn EventSink>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            catalog,
            bank,
            ledger,
            grants,
            discounts,
            sink,
            purchases: SessionMap::new(),
            moderations: SessionMap::new(),
            config,
        }
    }

    /// Products available for purchase.
    pub async fn products(&self) -> DomainResult<Vec<Product>> {
        self.catalog.list().await
    }

    /// Buyer picks a product; their session moves to `ConfirmingPurchase`
    /// with the catalog price snapshotted.
    ///
    /// A buyer who already confirmed and owes a receipt gets a fresh
    /// session instead: the pending ledger row stays pending and the old
    /// conversation is simply abandoned.
    pub async fn select_product(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> DomainResult<Product> {
        let product = self.catalog.get(product_id).await?;
        let now = Utc::now();

        let mut session = match self.purchases.get(user_id) {
            Some(s) if s.state != PurchaseState::AwaitingReceipt => s,
            _ => PurchaseSession::start(user_id, now),
        };
        session.select(product.id, &product.name, product.price, now)?;
        self.purchases.insert(user_id, session);
        Ok(product)
    }

    /// Buyer asks to enter a discount code.
    pub fn request_discount_code(&self, user_id: UserId) -> DomainResult<()> {
        self.purchases
            .with_mut(user_id, |s| s.request_discount(Utc::now()))
    }

    /// Buyer submits a discount code.
    ///
    /// A session applies at most one code per selection: repeats return
    /// `AlreadyApplied` without consuming a use or re-validating the code,
    /// and the first price stands.
    pub async fn apply_discount_code(
        &self,
        user_id: UserId,
        code_text: &str,
    ) -> DomainResult<DiscountApplication> {
        let now = Utc::now();
        let session = self
            .purchases
            .get(user_id)
            .ok_or_else(|| DomainError::conflict("no active purchase session"))?;

        if session.discount_applied() {
            let final_price = self
                .purchases
                .with_mut(user_id, |s| s.note_already_applied(now))?;
            return Ok(DiscountApplication::AlreadyApplied { final_price });
        }

        let base_price = match (session.state, session.base_price) {
            (
                PurchaseState::ConfirmingPurchase | PurchaseState::AwaitingDiscountCode,
                Some(price),
            ) => price,
            _ => return Err(DomainError::conflict("no product pending confirmation")),
        };

        // Redeem first: the registry's check-and-increment is the atomic
        // step, and only a successful redemption may touch the session.
        let discount = self.discounts.redeem(code_text, now.date_naive()).await?;
        let final_price = discounted_price(base_price, discount);
        let code = normalize_code(code_text);
        self.purchases
            .with_mut(user_id, |s| s.apply_discount(&code, final_price, now))?;

        Ok(DiscountApplication::Applied { final_price })
    }

    /// Buyer confirms they will pay. Opens a `Pending` ledger row at the
    /// session's effective price and moves the session to `AwaitingReceipt`.
    pub async fn confirm_payment(&self, user_id: UserId) -> DomainResult<PaymentInstructions> {
        let now = Utc::now();
        let session = self
            .purchases
            .get(user_id)
            .ok_or_else(|| DomainError::conflict("no active purchase session"))?;
        if session.state != PurchaseState::ConfirmingPurchase {
            return Err(DomainError::conflict("no product pending confirmation"));
        }
        let (product_id, product_name) = match (session.product_id, session.product_name.clone()) {
            (Some(id), Some(name)) => (id, name),
            _ => return Err(DomainError::conflict("no product selected")),
        };
        let amount_due = session.effective_price();

        let transaction = self
            .ledger
            .open(user_id, product_id, &product_name, amount_due, now)
            .await?;
        self.purchases
            .with_mut(user_id, |s| s.confirm(transaction.id, now))?;

        tracing::info!(
            user = %user_id,
            transaction = %transaction.id,
            product = %product_name,
            amount_due,
            "purchase confirmed, awaiting receipt"
        );
        Ok(PaymentInstructions {
            transaction_id: transaction.id,
            product_name,
            amount_due,
        })
    }

    /// Buyer hands over a payment receipt. Emits `ModerationRequested` and
    /// ends the conversation; the purchase now lives only in the ledger.
    pub async fn submit_receipt(
        &self,
        user_id: UserId,
        receipt_ref: &str,
    ) -> DomainResult<TransactionId> {
        let session = self
            .purchases
            .get(user_id)
            .ok_or_else(|| DomainError::conflict("no active purchase session"))?;
        if session.state != PurchaseState::AwaitingReceipt {
            return Err(DomainError::conflict("payment not confirmed yet"));
        }
        let transaction_id = session
            .transaction_id
            .ok_or_else(|| DomainError::conflict("payment not confirmed yet"))?;

        let transaction = self.ledger.get(transaction_id).await?;
        self.sink.emit(OutboundEvent::ModerationRequested {
            transaction_id,
            user_id,
            product_name: transaction.product_name,
            price_charged: transaction.price_charged,
            receipt_ref: receipt_ref.to_string(),
        });
        self.purchases.remove(user_id);

        tracing::info!(user = %user_id, transaction = %transaction_id, "receipt submitted");
        Ok(transaction_id)
    }

    /// Moderator approves a pending purchase: allocate a link, resolve the
    /// ledger row, mint a grant, notify the buyer.
    ///
    /// When the bank is exhausted the ledger row stays `Pending` and a
    /// `LowInventoryAlert` goes out; once links are restocked the same call
    /// can be retried and will succeed exactly once.
    pub async fn admin_approve(
        &self,
        moderator_id: UserId,
        transaction_id: TransactionId,
    ) -> DomainResult<AccessGrant> {
        let now = Utc::now();
        let transaction = self.ledger.get(transaction_id).await?;
        if transaction.status != TransactionStatus::Pending {
            return Err(DomainError::conflict(format!(
                "transaction {transaction_id} already {}",
                transaction.status.as_str()
            )));
        }

        let link = match self
            .bank
            .allocate(transaction.product_id, transaction.user_id, transaction_id, now)
            .await
        {
            Ok(link) => link,
            Err(err @ DomainError::Exhausted(_)) => {
                tracing::warn!(
                    transaction = %transaction_id,
                    product = %transaction.product_name,
                    "approval blocked, no unused links left"
                );
                self.sink.emit(OutboundEvent::LowInventoryAlert {
                    product_id: transaction.product_id,
                    product_name: transaction.product_name,
                    transaction_id,
                });
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self.ledger.transition(transaction_id, Resolution::Approved).await {
            // Another moderator resolved the row between our status check
            // and this claim. The link allocated above stays consumed and
            // needs manual recovery.
            tracing::warn!(
                transaction = %transaction_id,
                link = %link.id,
                error = %err,
                "ledger claim lost after link allocation"
            );
            return Err(err);
        }

        let purchased_on = now.date_naive();
        let grant = AccessGrant {
            user_id: transaction.user_id,
            transaction_id,
            product_name: transaction.product_name.clone(),
            link: link.link,
            purchased_on,
            expires_on: grant_expiry(purchased_on, self.config.grant_duration_days),
            active: true,
        };
        self.grants.record(grant.clone()).await?;

        tracing::info!(
            moderator = %moderator_id,
            transaction = %transaction_id,
            buyer = %transaction.user_id,
            product = %transaction.product_name,
            "purchase approved"
        );
        self.sink.emit(OutboundEvent::GrantIssued {
            user_id: transaction.user_id,
            transaction_id,
            product_name: transaction.product_name,
            link: grant.link.clone(),
        });
        Ok(grant)
    }

    /// Moderator starts rejecting a purchase: verify it is still pending
    /// and open a session awaiting the rejection reason.
    ///
    /// `notification_ref` identifies the moderation notice on the
    /// transport side so the outcome can be reported against it.
    pub async fn admin_reject_start(
        &self,
        moderator_id: UserId,
        transaction_id: TransactionId,
        notification_ref: &str,
    ) -> DomainResult<()> {
        let transaction = self.ledger.get(transaction_id).await?;
        if transaction.status != TransactionStatus::Pending {
            return Err(DomainError::conflict(format!(
                "transaction {transaction_id} already {}",
                transaction.status.as_str()
            )));
        }
        self.moderations.insert(
            moderator_id,
            ModerationSession::open(
                moderator_id,
                transaction_id,
                transaction.user_id,
                notification_ref,
                Utc::now(),
            ),
        );
        Ok(())
    }

    /// Moderator supplies the rejection reason, resolving the purchase.
    ///
    /// The session is consumed either way; if the ledger claim fails
    /// (someone else resolved the row first) the moderator has to start
    /// over against a transaction that no longer needs them.
    pub async fn admin_reject_submit(
        &self,
        moderator_id: UserId,
        reason: &str,
    ) -> DomainResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("rejection reason cannot be empty"));
        }
        let session = self
            .moderations
            .remove(moderator_id)
            .ok_or_else(|| DomainError::conflict("no rejection in progress"))?;

        self.ledger
            .transition(session.transaction_id, Resolution::Rejected)
            .await?;

        tracing::info!(
            moderator = %moderator_id,
            transaction = %session.transaction_id,
            buyer = %session.target_user_id,
            "purchase rejected"
        );
        self.sink.emit(OutboundEvent::RejectionNotice {
            transaction_id: session.transaction_id,
            user_id: session.target_user_id,
            reason: reason.to_string(),
            notification_ref: session.notification_ref,
        });
        Ok(())
    }

    /// One-shot rejection for callers that already have the reason in hand.
    pub async fn admin_reject(
        &self,
        moderator_id: UserId,
        transaction_id: TransactionId,
        reason: &str,
        notification_ref: &str,
    ) -> DomainResult<()> {
        self.admin_reject_start(moderator_id, transaction_id, notification_ref)
            .await?;
        self.admin_reject_submit(moderator_id, reason).await
    }

    /// Moderator restocks a product with fresh links. Returns how many
    /// were actually banked (blank lines and duplicates are skipped).
    pub async fn add_inventory(
        &self,
        moderator_id: UserId,
        product_id: ProductId,
        links: &[String],
    ) -> DomainResult<u64> {
        let product = self.catalog.get(product_id).await?;
        if links.iter().all(|l| l.trim().is_empty()) {
            return Err(DomainError::validation("no links supplied"));
        }
        let added = self.bank.add_bulk(product_id, links, Utc::now()).await?;

        tracing::info!(
            moderator = %moderator_id,
            product = %product.name,
            added,
            "inventory restocked"
        );
        Ok(added)
    }

    /// Moderator registers a new discount code. Returns `false` when the
    /// normalized code text is already taken.
    pub async fn create_discount_code(
        &self,
        moderator_id: UserId,
        code: &str,
        kind: DiscountKind,
        value: u64,
        max_uses: u64,
        expires_on: Option<NaiveDate>,
    ) -> DomainResult<bool> {
        if code.trim().is_empty() {
            return Err(DomainError::validation("code text cannot be empty"));
        }
        if value == 0 {
            return Err(DomainError::validation("discount value must be positive"));
        }
        if kind == DiscountKind::Percent && value > 100 {
            return Err(DomainError::validation(
                "percent discount cannot exceed 100",
            ));
        }
        if max_uses == 0 {
            return Err(DomainError::validation("max uses must be positive"));
        }

        let created = self
            .discounts
            .create(code, kind, value, max_uses, expires_on, Utc::now())
            .await?;
        if created {
            tracing::info!(moderator = %moderator_id, code = %normalize_code(code), "discount code created");
        }
        Ok(created)
    }

    /// Unused-link counts for every catalog product (moderator view).
    /// Products with an empty bank report zero.
    pub async fn inventory_status(&self) -> DomainResult<Vec<StockLevel>> {
        let counts = self.bank.unused_counts().await?;
        let products = self.catalog.list().await?;
        Ok(products
            .into_iter()
            .map(|p| StockLevel {
                remaining: counts.get(&p.id).copied().unwrap_or(0),
                product_id: p.id,
                product_name: p.name,
            })
            .collect())
    }

    /// Active grants held by a buyer, oldest purchase first.
    pub async fn purchases_for(&self, user_id: UserId) -> DomainResult<Vec<AccessGrant>> {
        self.grants.for_user(user_id).await
    }

    /// Active, unexpired discount codes (moderator view).
    pub async fn list_discount_codes(&self) -> DomainResult<Vec<DiscountCode>> {
        self.discounts.list(Utc::now().date_naive()).await
    }

    /// Current purchase conversation for a buyer, if any.
    pub fn purchase_session(&self, user_id: UserId) -> Option<PurchaseSession> {
        self.purchases.get(user_id)
    }

    /// Evict sessions idle longer than the configured TTL. Returns how
    /// many were dropped. Called by the reaper; safe to call directly.
    pub fn reap_sessions(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.session_ttl;
        let buyers = self.purchases.evict_stale(now, ttl);
        let moderators = self.moderations.evict_stale(now, ttl);
        let evicted = buyers.len() + moderators.len();
        if evicted > 0 {
            tracing::debug!(
                buyers = buyers.len(),
                moderators = moderators.len(),
                "evicted stale sessions"
            );
        }
        evicted
    }
}

fn grant_expiry(purchased_on: NaiveDate, duration_days: u64) -> NaiveDate {
    purchased_on
        .checked_add_days(Days::new(duration_days))
        .unwrap_or(NaiveDate::MAX)
}
