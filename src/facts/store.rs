//! # Fact Store
//!
//! Content-addressed snapshot persistence. Upsert-by-hash is the single
//! idempotence mechanism: a second write of the same `(tenant, domain,
//! fact_hash)` is a no-op that returns the row already stored.

use std::collections::HashMap;
use std::sync::RwLock;

use futures_util::future::{self, BoxFuture, FutureExt};

use super::errors::{FactError, FactResult};
use super::snapshot::{EntityRef, FactDomain, FactSnapshot};

/// Snapshot persistence
pub trait FactStore: Send + Sync {
    /// Insert unless a row with the same tenant, domain and hash exists.
    /// Returns the stored row either way.
    fn upsert(&self, snapshot: FactSnapshot) -> BoxFuture<'_, FactResult<FactSnapshot>>;

    /// Row with the greatest `computed_at` for an entity
    fn latest<'a>(
        &'a self,
        tenant_id: &'a str,
        entity: &'a EntityRef,
    ) -> BoxFuture<'a, FactResult<Option<FactSnapshot>>>;

    /// Look up a row by hash
    fn find_by_hash<'a>(
        &'a self,
        tenant_id: &'a str,
        domain: FactDomain,
        fact_hash: &'a str,
    ) -> BoxFuture<'a, FactResult<Option<FactSnapshot>>>;

    /// All rows for an entity, oldest first
    fn history<'a>(
        &'a self,
        tenant_id: &'a str,
        entity: &'a EntityRef,
    ) -> BoxFuture<'a, FactResult<Vec<FactSnapshot>>>;
}

type HashKey = (String, FactDomain, String);

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<FactSnapshot>,
    by_hash: HashMap<HashKey, usize>,
}

/// In-memory fact store
#[derive(Debug, Default)]
pub struct MemoryFactStore {
    inner: RwLock<Inner>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all tenants
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn upsert_sync(&self, snapshot: FactSnapshot) -> FactResult<FactSnapshot> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| FactError::Internal("Lock poisoned".into()))?;

        let key = (
            snapshot.tenant_id.clone(),
            snapshot.domain,
            snapshot.fact_hash.clone(),
        );
        if let Some(&idx) = inner.by_hash.get(&key) {
            return Ok(inner.rows[idx].clone());
        }

        let idx = inner.rows.len();
        inner.rows.push(snapshot.clone());
        inner.by_hash.insert(key, idx);
        Ok(snapshot)
    }

    fn latest_sync(&self, tenant_id: &str, entity: &EntityRef) -> FactResult<Option<FactSnapshot>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| FactError::Internal("Lock poisoned".into()))?;

        // max_by keeps the last maximum, so equal timestamps resolve to the later insert
        Ok(inner
            .rows
            .iter()
            .filter(|s| s.tenant_id == tenant_id && &s.entity == entity)
            .max_by(|a, b| a.computed_at.cmp(&b.computed_at))
            .cloned())
    }

    fn find_sync(
        &self,
        tenant_id: &str,
        domain: FactDomain,
        fact_hash: &str,
    ) -> FactResult<Option<FactSnapshot>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| FactError::Internal("Lock poisoned".into()))?;
        let key = (tenant_id.to_string(), domain, fact_hash.to_string());
        Ok(inner.by_hash.get(&key).map(|&idx| inner.rows[idx].clone()))
    }

    fn history_sync(&self, tenant_id: &str, entity: &EntityRef) -> FactResult<Vec<FactSnapshot>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| FactError::Internal("Lock poisoned".into()))?;
        let mut rows: Vec<FactSnapshot> = inner
            .rows
            .iter()
            .filter(|s| s.tenant_id == tenant_id && &s.entity == entity)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        rows.sort_by(|a, b| a.computed_at.cmp(&b.computed_at));
        Ok(rows)
    }
}

impl FactStore for MemoryFactStore {
    fn upsert(&self, snapshot: FactSnapshot) -> BoxFuture<'_, FactResult<FactSnapshot>> {
        future::ready(self.upsert_sync(snapshot)).boxed()
    }

    fn latest<'a>(
        &'a self,
        tenant_id: &'a str,
        entity: &'a EntityRef,
    ) -> BoxFuture<'a, FactResult<Option<FactSnapshot>>> {
        future::ready(self.latest_sync(tenant_id, entity)).boxed()
    }

    fn find_by_hash<'a>(
        &'a self,
        tenant_id: &'a str,
        domain: FactDomain,
        fact_hash: &'a str,
    ) -> BoxFuture<'a, FactResult<Option<FactSnapshot>>> {
        future::ready(self.find_sync(tenant_id, domain, fact_hash)).boxed()
    }

    fn history<'a>(
        &'a self,
        tenant_id: &'a str,
        entity: &'a EntityRef,
    ) -> BoxFuture<'a, FactResult<Vec<FactSnapshot>>> {
        future::ready(self.history_sync(tenant_id, entity)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::snapshot::COMPUTED_BY_SYSTEM;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn snapshot(tenant: &str, entity: EntityRef, hash: &str, offset_secs: i64) -> FactSnapshot {
        FactSnapshot {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            domain: entity.domain(),
            entity,
            fact_hash: hash.to_string(),
            fact_version: 1,
            facts: json!({"hash": hash}),
            computed_at: Utc::now() + Duration::seconds(offset_secs),
            computed_by: COMPUTED_BY_SYSTEM.to_string(),
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryFactStore::new();
        let first = store
            .upsert(snapshot("t", EntityRef::loan("L1"), "h1", 0))
            .await
            .unwrap();
        let second = store
            .upsert(snapshot("t", EntityRef::loan("L1"), "h1", 5))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.computed_at, second.computed_at);
    }

    #[tokio::test]
    async fn test_same_hash_other_tenant_is_distinct() {
        let store = MemoryFactStore::new();
        store.upsert(snapshot("t1", EntityRef::loan("L1"), "h1", 0)).await.unwrap();
        store.upsert(snapshot("t2", EntityRef::loan("L1"), "h1", 0)).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_is_max_computed_at() {
        let store = MemoryFactStore::new();
        let entity = EntityRef::loan("L1");
        store.upsert(snapshot("t", entity.clone(), "h2", 10)).await.unwrap();
        store.upsert(snapshot("t", entity.clone(), "h1", 0)).await.unwrap();
        store.upsert(snapshot("t", EntityRef::loan("L2"), "h3", 20)).await.unwrap();

        let latest = store.latest("t", &entity).await.unwrap().unwrap();
        assert_eq!(latest.fact_hash, "h2");

        let history = store.history("t", &entity).await.unwrap();
        let hashes: Vec<&str> = history.iter().map(|s| s.fact_hash.as_str()).collect();
        assert_eq!(hashes, vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_find_by_hash_scoped_by_domain() {
        let store = MemoryFactStore::new();
        store.upsert(snapshot("t", EntityRef::loan("L1"), "h1", 0)).await.unwrap();

        assert!(store
            .find_by_hash("t", FactDomain::Readiness, "h1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_hash("t", FactDomain::Covenant, "h1")
            .await
            .unwrap()
            .is_none());
    }
}
