//! End-to-end flows through the fulfillment facade over the in-memory
//! stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use linkvend_bank::InMemoryLinkBank;
use linkvend_catalog::{InMemoryCatalog, Product};
use linkvend_core::{DomainError, UserId};
use linkvend_discounts::{DiscountKind, InMemoryDiscountRegistry};
use linkvend_ledger::{InMemoryGrantStore, InMemoryLedger};
use linkvend_service::{
    DiscountApplication, Fulfillment, FulfillmentConfig, InMemoryEventBus, OutboundEvent,
    SessionReaper, Subscription,
};
use linkvend_sessions::PurchaseState;

const BUYER: UserId = UserId::new(1001);
const MODERATOR: UserId = UserId::new(42);

fn links(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| s.to_string()).collect()
}

fn harness(products: Vec<Product>) -> (Arc<Fulfillment>, Subscription) {
    let bus = Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe();
    let fulfillment = Arc::new(Fulfillment::new(
        Arc::new(InMemoryCatalog::with_products(products)),
        Arc::new(InMemoryLinkBank::new()),
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryGrantStore::new()),
        Arc::new(InMemoryDiscountRegistry::new()),
        bus,
        FulfillmentConfig::default(),
    ));
    (fulfillment, events)
}

fn one_product() -> (Vec<Product>, Product) {
    let product = Product::new("20 GB / 30 days", 65_000, "20 GB, 30-day validity");
    (vec![product.clone()], product)
}

#[tokio::test]
async fn full_purchase_flow_issues_one_grant() {
    let (products, product) = one_product();
    let (service, events) = harness(products);
    service
        .add_inventory(MODERATOR, product.id, &links(&["vpn://key-1"]))
        .await
        .unwrap();

    service.select_product(BUYER, product.id).await.unwrap();
    let instructions = service.confirm_payment(BUYER).await.unwrap();
    assert_eq!(instructions.amount_due, 65_000);

    let tx_id = service.submit_receipt(BUYER, "receipt-msg-7").await.unwrap();
    assert_eq!(tx_id, instructions.transaction_id);
    assert!(service.purchase_session(BUYER).is_none());

    match events.try_recv().unwrap() {
        OutboundEvent::ModerationRequested {
            transaction_id,
            user_id,
            price_charged,
            receipt_ref,
            ..
        } => {
            assert_eq!(transaction_id, tx_id);
            assert_eq!(user_id, BUYER);
            assert_eq!(price_charged, 65_000);
            assert_eq!(receipt_ref, "receipt-msg-7");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let grant = service.admin_approve(MODERATOR, tx_id).await.unwrap();
    assert_eq!(grant.link, "vpn://key-1");
    assert_eq!(grant.user_id, BUYER);

    match events.try_recv().unwrap() {
        OutboundEvent::GrantIssued { user_id, link, .. } => {
            assert_eq!(user_id, BUYER);
            assert_eq!(link, "vpn://key-1");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let grants = service.purchases_for(BUYER).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].transaction_id, tx_id);

    // The only link is now consumed.
    let stock = service.inventory_status().await.unwrap();
    assert_eq!(stock.len(), 1);
    assert_eq!(stock[0].remaining, 0);
}

#[tokio::test]
async fn approve_is_exactly_once() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);
    service
        .add_inventory(MODERATOR, product.id, &links(&["vpn://key-1", "vpn://key-2"]))
        .await
        .unwrap();

    service.select_product(BUYER, product.id).await.unwrap();
    service.confirm_payment(BUYER).await.unwrap();
    let tx_id = service.submit_receipt(BUYER, "r").await.unwrap();

    service.admin_approve(MODERATOR, tx_id).await.unwrap();
    let again = service.admin_approve(MODERATOR, tx_id).await;
    assert!(matches!(again, Err(DomainError::Conflict(_))));

    // The retry consumed nothing.
    let stock = service.inventory_status().await.unwrap();
    assert_eq!(stock[0].remaining, 1);
    assert_eq!(service.purchases_for(BUYER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_approval_recovers_after_restock() {
    let (products, product) = one_product();
    let (service, events) = harness(products);

    service.select_product(BUYER, product.id).await.unwrap();
    service.confirm_payment(BUYER).await.unwrap();
    let tx_id = service.submit_receipt(BUYER, "r").await.unwrap();
    let _ = events.try_recv(); // ModerationRequested

    // Empty bank: approval fails, row stays pending, alert goes out.
    let err = service.admin_approve(MODERATOR, tx_id).await.unwrap_err();
    assert!(matches!(err, DomainError::Exhausted(_)));
    match events.try_recv().unwrap() {
        OutboundEvent::LowInventoryAlert { transaction_id, .. } => {
            assert_eq!(transaction_id, tx_id);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    service
        .add_inventory(MODERATOR, product.id, &links(&["vpn://fresh"]))
        .await
        .unwrap();

    // Same approval retried now succeeds, exactly once, on the new link.
    let grant = service.admin_approve(MODERATOR, tx_id).await.unwrap();
    assert_eq!(grant.link, "vpn://fresh");
    assert_eq!(service.purchases_for(BUYER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn discount_applies_once_per_session() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);
    service
        .create_discount_code(MODERATOR, "SUMMER10", DiscountKind::Percent, 10, 5, None)
        .await
        .unwrap();

    service.select_product(BUYER, product.id).await.unwrap();
    service.request_discount_code(BUYER).unwrap();

    let first = service.apply_discount_code(BUYER, "summer10").await.unwrap();
    assert_eq!(first, DiscountApplication::Applied { final_price: 58_500 });

    // Repeat consumes no further use and leaves the price alone.
    let second = service.apply_discount_code(BUYER, "SUMMER10").await.unwrap();
    assert_eq!(
        second,
        DiscountApplication::AlreadyApplied { final_price: 58_500 }
    );

    let instructions = service.confirm_payment(BUYER).await.unwrap();
    assert_eq!(instructions.amount_due, 58_500);

    let codes = service.list_discount_codes().await.unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].current_uses, 1);
}

#[tokio::test]
async fn failed_discount_leaves_session_discountable() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);
    service
        .create_discount_code(MODERATOR, "REAL", DiscountKind::Fixed, 5_000, 1, None)
        .await
        .unwrap();

    service.select_product(BUYER, product.id).await.unwrap();
    service.request_discount_code(BUYER).unwrap();

    let err = service.apply_discount_code(BUYER, "FAKE").await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound));

    // The buyer can still enter a correct code.
    let applied = service.apply_discount_code(BUYER, "REAL").await.unwrap();
    assert_eq!(applied.final_price(), 60_000);
}

#[tokio::test]
async fn reselect_resets_applied_discount() {
    let cheap = Product::new("5 GB / 7 days", 20_000, "");
    let (mut products, product) = one_product();
    products.push(cheap.clone());
    let (service, _events) = harness(products);
    service
        .create_discount_code(MODERATOR, "CUT", DiscountKind::Fixed, 5_000, 10, None)
        .await
        .unwrap();

    service.select_product(BUYER, product.id).await.unwrap();
    service.request_discount_code(BUYER).unwrap();
    service.apply_discount_code(BUYER, "CUT").await.unwrap();

    // New selection drops the old code; the new price is the catalog price.
    service.select_product(BUYER, cheap.id).await.unwrap();
    let instructions = service.confirm_payment(BUYER).await.unwrap();
    assert_eq!(instructions.amount_due, 20_000);

    // The earlier redemption still counted against the cap.
    let codes = service.list_discount_codes().await.unwrap();
    assert_eq!(codes[0].current_uses, 1);
}

#[tokio::test]
async fn rejection_resolves_ledger_and_notifies_buyer() {
    let (products, product) = one_product();
    let (service, events) = harness(products);

    service.select_product(BUYER, product.id).await.unwrap();
    service.confirm_payment(BUYER).await.unwrap();
    let tx_id = service.submit_receipt(BUYER, "r").await.unwrap();
    let _ = events.try_recv();

    service
        .admin_reject_start(MODERATOR, tx_id, "notice-9")
        .await
        .unwrap();
    service
        .admin_reject_submit(MODERATOR, "  receipt is illegible  ")
        .await
        .unwrap();

    match events.try_recv().unwrap() {
        OutboundEvent::RejectionNotice {
            transaction_id,
            user_id,
            reason,
            notification_ref,
        } => {
            assert_eq!(transaction_id, tx_id);
            assert_eq!(user_id, BUYER);
            assert_eq!(reason, "receipt is illegible");
            assert_eq!(notification_ref, "notice-9");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Resolved: neither approval nor a second rejection can claim the row.
    let approve = service.admin_approve(MODERATOR, tx_id).await;
    assert!(matches!(approve, Err(DomainError::Conflict(_))));
    let reject = service.admin_reject(MODERATOR, tx_id, "again", "notice-10").await;
    assert!(matches!(reject, Err(DomainError::Conflict(_))));
}

#[tokio::test]
async fn empty_rejection_reason_keeps_session_open() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);

    service.select_product(BUYER, product.id).await.unwrap();
    service.confirm_payment(BUYER).await.unwrap();
    let tx_id = service.submit_receipt(BUYER, "r").await.unwrap();

    service
        .admin_reject_start(MODERATOR, tx_id, "notice-1")
        .await
        .unwrap();

    let err = service.admin_reject_submit(MODERATOR, "   ").await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    // The session survived the bad input; a real reason still works.
    service
        .admin_reject_submit(MODERATOR, "wrong amount")
        .await
        .unwrap();
}

#[tokio::test]
async fn moderator_sessions_are_isolated_per_moderator() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);
    let other_moderator = UserId::new(43);

    service.select_product(BUYER, product.id).await.unwrap();
    service.confirm_payment(BUYER).await.unwrap();
    let tx_id = service.submit_receipt(BUYER, "r").await.unwrap();

    service
        .admin_reject_start(MODERATOR, tx_id, "notice-1")
        .await
        .unwrap();

    let err = service
        .admin_reject_submit(other_moderator, "not mine")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn out_of_order_buyer_actions_conflict() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);

    // Nothing selected yet.
    assert!(service.confirm_payment(BUYER).await.is_err());
    assert!(service.submit_receipt(BUYER, "r").await.is_err());
    assert!(service.request_discount_code(BUYER).is_err());

    service.select_product(BUYER, product.id).await.unwrap();
    // Receipt before confirming.
    assert!(service.submit_receipt(BUYER, "r").await.is_err());

    service.confirm_payment(BUYER).await.unwrap();
    // Discount entry after confirming.
    assert!(service.request_discount_code(BUYER).is_err());
}

#[tokio::test]
async fn selecting_after_confirm_starts_a_fresh_conversation() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);

    service.select_product(BUYER, product.id).await.unwrap();
    let first = service.confirm_payment(BUYER).await.unwrap();

    // Buyer abandons the receipt step and starts over.
    service.select_product(BUYER, product.id).await.unwrap();
    let session = service.purchase_session(BUYER).unwrap();
    assert_eq!(session.state, PurchaseState::ConfirmingPurchase);
    assert_eq!(session.transaction_id, None);

    let second = service.confirm_payment(BUYER).await.unwrap();
    assert_ne!(first.transaction_id, second.transaction_id);
}

#[tokio::test]
async fn add_inventory_validates_product_and_input() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);

    let missing = service
        .add_inventory(MODERATOR, linkvend_core::ProductId::new(), &links(&["x"]))
        .await;
    assert!(matches!(missing, Err(DomainError::NotFound)));

    let blank = service
        .add_inventory(MODERATOR, product.id, &links(&["", "   "]))
        .await;
    assert!(matches!(blank, Err(DomainError::Validation(_))));

    // Duplicates inside one batch are banked once.
    let added = service
        .add_inventory(MODERATOR, product.id, &links(&["vpn://a", "vpn://a", "vpn://b"]))
        .await
        .unwrap();
    assert_eq!(added, 2);
}

#[tokio::test]
async fn create_discount_code_validates_and_dedupes() {
    let (products, _product) = one_product();
    let (service, _events) = harness(products);

    assert!(service
        .create_discount_code(MODERATOR, "OK", DiscountKind::Percent, 0, 5, None)
        .await
        .is_err());
    assert!(service
        .create_discount_code(MODERATOR, "OK", DiscountKind::Percent, 101, 5, None)
        .await
        .is_err());
    assert!(service
        .create_discount_code(MODERATOR, "OK", DiscountKind::Fixed, 1_000, 0, None)
        .await
        .is_err());
    assert!(service
        .create_discount_code(MODERATOR, "  ", DiscountKind::Fixed, 1_000, 5, None)
        .await
        .is_err());

    let created = service
        .create_discount_code(MODERATOR, "Promo", DiscountKind::Fixed, 1_000, 5, None)
        .await
        .unwrap();
    assert!(created);
    let duplicate = service
        .create_discount_code(MODERATOR, "PROMO", DiscountKind::Fixed, 2_000, 5, None)
        .await
        .unwrap();
    assert!(!duplicate);
}

#[tokio::test]
async fn reaper_evicts_idle_sessions_without_touching_the_ledger() {
    let (products, product) = one_product();
    let (service, _events) = harness(products);

    service.select_product(BUYER, product.id).await.unwrap();
    let instructions = service.confirm_payment(BUYER).await.unwrap();

    // Default TTL is 30 minutes; an hour from now the session is stale.
    let later = Utc::now() + chrono::Duration::hours(1);
    let evicted = service.reap_sessions(later);
    assert_eq!(evicted, 1);
    assert!(service.purchase_session(BUYER).is_none());

    // The pending row outlives the conversation and can still be approved.
    service
        .add_inventory(MODERATOR, product.id, &links(&["vpn://late"]))
        .await
        .unwrap();
    let grant = service
        .admin_approve(MODERATOR, instructions.transaction_id)
        .await
        .unwrap();
    assert_eq!(grant.link, "vpn://late");
}

#[tokio::test]
async fn reaper_thread_starts_and_stops_cleanly() {
    let (products, _product) = one_product();
    let (service, _events) = harness(products);

    let handle = SessionReaper::spawn(Arc::clone(&service), Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(30));
    handle.shutdown();
}
