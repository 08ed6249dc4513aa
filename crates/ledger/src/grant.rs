use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use linkvend_core::{DomainError, DomainResult, TransactionId, UserId};

/// The immutable record that a specific link was delivered to a specific user
/// via a specific transaction. Created exactly once per approved transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub product_name: String,
    pub link: String,
    pub purchased_on: NaiveDate,
    pub expires_on: NaiveDate,
    pub active: bool,
}

/// Storage for access grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Record a grant. Returns `Conflict` if the transaction already has
    /// one; a transaction never carries more than a single grant.
    async fn record(&self, grant: AccessGrant) -> DomainResult<()>;

    /// Active grants for a buyer, oldest purchase first.
    async fn for_user(&self, user_id: UserId) -> DomainResult<Vec<AccessGrant>>;

    /// The grant minted for a transaction, or `NotFound`.
    async fn for_transaction(&self, transaction_id: TransactionId) -> DomainResult<AccessGrant>;
}

/// In-memory grant store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<Vec<AccessGrant>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn record(&self, grant: AccessGrant) -> DomainResult<()> {
        let mut grants = self.grants.write().unwrap();
        if grants
            .iter()
            .any(|g| g.transaction_id == grant.transaction_id)
        {
            return Err(DomainError::conflict(format!(
                "transaction {} already granted",
                grant.transaction_id
            )));
        }
        grants.push(grant);
        Ok(())
    }

    async fn for_user(&self, user_id: UserId) -> DomainResult<Vec<AccessGrant>> {
        Ok(self
            .grants
            .read()
            .unwrap()
            .iter()
            .filter(|g| g.user_id == user_id && g.active)
            .cloned()
            .collect())
    }

    async fn for_transaction(&self, transaction_id: TransactionId) -> DomainResult<AccessGrant> {
        self.grants
            .read()
            .unwrap()
            .iter()
            .find(|g| g.transaction_id == transaction_id)
            .cloned()
            .ok_or(DomainError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant_for(user: i64, transaction_id: TransactionId) -> AccessGrant {
        let purchased_on = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        AccessGrant {
            user_id: UserId::new(user),
            transaction_id,
            product_name: "20 GB".to_string(),
            link: "vpn://example".to_string(),
            purchased_on,
            expires_on: purchased_on + chrono::Days::new(30),
            active: true,
        }
    }

    #[tokio::test]
    async fn a_transaction_gets_at_most_one_grant() {
        let store = InMemoryGrantStore::new();
        let tx = TransactionId::new();

        store.record(grant_for(1, tx)).await.unwrap();
        let err = store.record(grant_for(1, tx)).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn for_user_lists_only_that_users_active_grants() {
        let store = InMemoryGrantStore::new();
        store.record(grant_for(1, TransactionId::new())).await.unwrap();
        store.record(grant_for(2, TransactionId::new())).await.unwrap();

        let mut lapsed = grant_for(1, TransactionId::new());
        lapsed.active = false;
        store.record(lapsed).await.unwrap();

        let grants = store.for_user(UserId::new(1)).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].user_id, UserId::new(1));
    }

    #[tokio::test]
    async fn for_transaction_finds_the_grant() {
        let store = InMemoryGrantStore::new();
        let tx = TransactionId::new();
        store.record(grant_for(5, tx)).await.unwrap();

        let grant = store.for_transaction(tx).await.unwrap();
        assert_eq!(grant.transaction_id, tx);

        let err = store.for_transaction(TransactionId::new()).await.unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
