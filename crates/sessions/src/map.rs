use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use linkvend_core::{DomainError, DomainResult, UserId};

/// Anything with an inactivity clock.
pub trait Expire {
    fn last_active(&self) -> DateTime<Utc>;
}

/// Registry of live sessions, one per actor.
///
/// Sessions are single-actor, so no per-session locking is needed beyond the
/// map lock; mutations run under it via [`SessionMap::with_mut`].
#[derive(Debug, Default)]
pub struct SessionMap<S> {
    inner: RwLock<HashMap<UserId, S>>,
}

impl<S: Clone + Expire> SessionMap<S> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Install (or replace) the actor's session.
    pub fn insert(&self, actor: UserId, session: S) {
        self.inner.write().unwrap().insert(actor, session);
    }

    pub fn get(&self, actor: UserId) -> Option<S> {
        self.inner.read().unwrap().get(&actor).cloned()
    }

    /// Run a fallible mutation against the actor's session in place.
    /// `Conflict` when the actor has no live session.
    pub fn with_mut<T>(
        &self,
        actor: UserId,
        f: impl FnOnce(&mut S) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut inner = self.inner.write().unwrap();
        let session = inner
            .get_mut(&actor)
            .ok_or_else(|| DomainError::conflict("no active session for actor"))?;
        f(session)
    }

    /// Remove and return the actor's session (terminal transition).
    pub fn remove(&self, actor: UserId) -> Option<S> {
        self.inner.write().unwrap().remove(&actor)
    }

    /// Evict sessions idle longer than `ttl`. Expiry discards ephemeral
    /// state only; it never touches ledger rows or inventory.
    pub fn evict_stale(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<(UserId, S)> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut inner = self.inner.write().unwrap();
        let stale: Vec<UserId> = inner
            .iter()
            .filter(|(_, s)| now - s.last_active() > ttl)
            .map(|(actor, _)| *actor)
            .collect();
        stale
            .into_iter()
            .filter_map(|actor| inner.remove(&actor).map(|s| (actor, s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purchase::PurchaseSession;

    #[test]
    fn with_mut_without_session_is_a_conflict() {
        let map: SessionMap<PurchaseSession> = SessionMap::new();
        let err = map.with_mut(UserId::new(1), |_| Ok(())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn evict_stale_removes_only_idle_sessions() {
        let map: SessionMap<PurchaseSession> = SessionMap::new();
        let now = Utc::now();
        let idle_start = now - chrono::Duration::minutes(45);

        map.insert(UserId::new(1), PurchaseSession::start(UserId::new(1), idle_start));
        map.insert(UserId::new(2), PurchaseSession::start(UserId::new(2), now));

        let evicted = map.evict_stale(now, Duration::from_secs(30 * 60));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, UserId::new(1));
        assert!(map.get(UserId::new(1)).is_none());
        assert!(map.get(UserId::new(2)).is_some());
    }

    #[test]
    fn remove_is_terminal() {
        let map: SessionMap<PurchaseSession> = SessionMap::new();
        let actor = UserId::new(3);
        map.insert(actor, PurchaseSession::start(actor, Utc::now()));
        assert!(map.remove(actor).is_some());
        assert!(map.remove(actor).is_none());
        assert!(map.is_empty());
    }
}
