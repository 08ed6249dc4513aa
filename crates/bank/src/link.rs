use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use linkvend_core::{DomainError, DomainResult, LinkId, ProductId, TransactionId, UserId};

/// One access link in the bank.
///
/// `used` is monotonic: once a record is claimed it stays claimed, and the
/// assignment fields never change again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: LinkId,
    pub product_id: ProductId,
    pub link: String,
    pub used: bool,
    pub assigned_user_id: Option<UserId>,
    pub assigned_transaction_id: Option<TransactionId>,
    pub added_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl LinkRecord {
    pub fn unused(product_id: ProductId, link: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self {
            id: LinkId::new(),
            product_id,
            link: link.into(),
            used: false,
            assigned_user_id: None,
            assigned_transaction_id: None,
            added_at,
            assigned_at: None,
        }
    }
}

/// The pool of single-use access links.
#[async_trait]
pub trait LinkBank: Send + Sync {
    /// Claim one unused link for the product and stamp the assignment, as a
    /// single indivisible conditional update. Two concurrent callers never
    /// receive the same record.
    ///
    /// Selection among unused candidates is oldest-added-first.
    ///
    /// Returns `Exhausted` when the product has no unused link left.
    async fn allocate(
        &self,
        product_id: ProductId,
        user_id: UserId,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> DomainResult<LinkRecord>;

    /// Insert links for a product, silently skipping any that collide with
    /// the global link-text uniqueness constraint or are blank. Returns the
    /// count actually inserted.
    async fn add_bulk(
        &self,
        product_id: ProductId,
        links: &[String],
        at: DateTime<Utc>,
    ) -> DomainResult<u64>;

    /// Remaining unused links per product. Products with no records at all do
    /// not appear; the caller fills in zeroes from the catalog.
    async fn unused_counts(&self) -> DomainResult<HashMap<ProductId, u64>>;
}

/// In-memory link bank for tests/dev.
///
/// Records live in a `Vec` in insertion order, which doubles as the
/// oldest-added-first allocation order. `allocate` holds the write lock for
/// the whole find-and-mark, so the claim is atomic.
#[derive(Debug, Default)]
pub struct InMemoryLinkBank {
    records: RwLock<Vec<LinkRecord>>,
}

impl InMemoryLinkBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a record by id (test/introspection helper).
    pub fn get(&self, id: LinkId) -> Option<LinkRecord> {
        self.records.read().unwrap().iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl LinkBank for InMemoryLinkBank {
    async fn allocate(
        &self,
        product_id: ProductId,
        user_id: UserId,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> DomainResult<LinkRecord> {
        let mut records = self.records.write().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.product_id == product_id && !r.used)
            .ok_or_else(|| {
                DomainError::exhausted(format!("no unused link for product {product_id}"))
            })?;

        record.used = true;
        record.assigned_user_id = Some(user_id);
        record.assigned_transaction_id = Some(transaction_id);
        record.assigned_at = Some(at);
        Ok(record.clone())
    }

    async fn add_bulk(
        &self,
        product_id: ProductId,
        links: &[String],
        at: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let mut records = self.records.write().unwrap();
        let mut added = 0u64;
        for link in links {
            let link = link.trim();
            if link.is_empty() {
                continue;
            }
            // Link text is unique across all products, not per product.
            if records.iter().any(|r| r.link == link) {
                continue;
            }
            records.push(LinkRecord::unused(product_id, link, at));
            added += 1;
        }
        Ok(added)
    }

    async fn unused_counts(&self) -> DomainResult<HashMap<ProductId, u64>> {
        let records = self.records.read().unwrap();
        let mut counts: HashMap<ProductId, u64> = HashMap::new();
        for record in records.iter() {
            let entry = counts.entry(record.product_id).or_default();
            if !record.used {
                *entry += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    async fn bank_with(product_id: ProductId, links: &[&str]) -> InMemoryLinkBank {
        let bank = InMemoryLinkBank::new();
        let owned: Vec<String> = links.iter().map(|s| s.to_string()).collect();
        bank.add_bulk(product_id, &owned, Utc::now()).await.unwrap();
        bank
    }

    #[tokio::test]
    async fn add_bulk_skips_duplicates() {
        let bank = InMemoryLinkBank::new();
        let product = ProductId::new();
        let links = vec!["L1".to_string(), "L2".to_string(), "L1".to_string()];
        let added = bank.add_bulk(product, &links, Utc::now()).await.unwrap();
        assert_eq!(added, 2);
    }

    #[tokio::test]
    async fn duplicate_check_spans_products() {
        let bank = InMemoryLinkBank::new();
        let first = ProductId::new();
        let second = ProductId::new();
        bank.add_bulk(first, &["L1".to_string()], Utc::now()).await.unwrap();
        let added = bank.add_bulk(second, &["L1".to_string()], Utc::now()).await.unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn allocate_is_oldest_added_first() {
        let product = ProductId::new();
        let bank = bank_with(product, &["first", "second"]).await;
        let user = UserId::new(7);

        let a = bank
            .allocate(product, user, TransactionId::new(), Utc::now())
            .await
            .unwrap();
        let b = bank
            .allocate(product, user, TransactionId::new(), Utc::now())
            .await
            .unwrap();
        assert_eq!(a.link, "first");
        assert_eq!(b.link, "second");
    }

    #[tokio::test]
    async fn allocate_stamps_assignment_and_exhausts() {
        let product = ProductId::new();
        let bank = bank_with(product, &["only"]).await;
        let user = UserId::new(42);
        let tx = TransactionId::new();

        let record = bank.allocate(product, user, tx, Utc::now()).await.unwrap();
        assert!(record.used);
        assert_eq!(record.assigned_user_id, Some(user));
        assert_eq!(record.assigned_transaction_id, Some(tx));
        assert!(record.assigned_at.is_some());

        let err = bank
            .allocate(product, user, TransactionId::new(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Exhausted(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_allocations_never_hand_out_a_link_twice() {
        let product = ProductId::new();
        let links: Vec<String> = (0..8).map(|i| format!("link-{i}")).collect();
        let bank = Arc::new(InMemoryLinkBank::new());
        bank.add_bulk(product, &links, Utc::now()).await.unwrap();

        // 20 claimants racing for 8 links.
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let bank = Arc::clone(&bank);
                tokio::spawn(async move {
                    bank.allocate(product, UserId::new(i), TransactionId::new(), Utc::now())
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        let won: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        let exhausted = outcomes
            .iter()
            .filter(|o| matches!(o, Err(DomainError::Exhausted(_))))
            .count();

        assert_eq!(won.len(), 8);
        assert_eq!(exhausted, 12);
        let distinct: HashSet<_> = won.iter().map(|r| r.id).collect();
        assert_eq!(distinct.len(), 8);
    }

    #[tokio::test]
    async fn unused_counts_track_allocations() {
        let product = ProductId::new();
        let bank = bank_with(product, &["a", "b", "c"]).await;
        bank.allocate(product, UserId::new(1), TransactionId::new(), Utc::now())
            .await
            .unwrap();

        let counts = bank.unused_counts().await.unwrap();
        assert_eq!(counts.get(&product), Some(&2));
    }
}
