//! TTL cache of aggregated shop statistics.
//!
//! Entries are JSON documents under `stats:{tenant}:{shop}` in a plain
//! [`StorageBackend`]. The backend TTL reclaims space; the `expires_at`
//! field, checked against the injected clock, decides validity.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storelink_storage::{Clock, PrincipalId, StorageBackend, StorageError, StorageResult, TenantId};

/// Counter name to value; `None` marks a counter that could not be fetched.
pub type Counters = BTreeMap<String, Option<i64>>;

/// One cached stats snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Tenant the stats belong to.
    pub tenant_id: TenantId,
    /// Shop the stats describe.
    pub principal_id: PrincipalId,
    /// Counter values.
    pub counters: Counters,
    /// When the values were fetched.
    pub fetched_at: DateTime<Utc>,
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry may still be served at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Cache key for a tenant and shop.
#[must_use]
pub fn cache_key(tenant: &TenantId, principal: &PrincipalId) -> Vec<u8> {
    format!("stats:{tenant}:{principal}").into_bytes()
}

/// Stats cache over a storage backend.
pub struct StatsCache {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl std::fmt::Debug for StatsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl StatsCache {
    /// Creates a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { backend, clock, ttl }
    }

    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or a serialization error for an entry that
    /// does not decode.
    pub async fn get(&self, tenant: &TenantId, principal: &PrincipalId) -> StorageResult<Option<CacheEntry>> {
        let Some(bytes) = self.backend.get(&cache_key(tenant, principal)).await? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::serialization_with_source("undecodable stats cache entry", e))?;

        Ok(entry.is_valid_at(self.clock.now()).then_some(entry))
    }

    /// Overwrites the entry with `counters` fetched now.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn put(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
        counters: Counters,
    ) -> StorageResult<CacheEntry> {
        let fetched_at = self.clock.now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = CacheEntry {
            tenant_id: tenant.clone(),
            principal_id: principal.clone(),
            counters,
            fetched_at,
            expires_at,
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| StorageError::serialization_with_source("failed to encode stats cache entry", e))?;

        self.backend.set_with_ttl(cache_key(tenant, principal), bytes, self.ttl).await?;
        Ok(entry)
    }

    /// Removes the entry. Removing an absent entry succeeds.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn invalidate(&self, tenant: &TenantId, principal: &PrincipalId) -> StorageResult<()> {
        self.backend.delete(&cache_key(tenant, principal)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use storelink_storage::{ManualClock, MemoryBackend};

    use super::*;

    fn cache(clock: &ManualClock) -> (StatsCache, MemoryBackend) {
        let backend = MemoryBackend::with_clock(Arc::new(clock.clone()));
        let cache = StatsCache::new(Arc::new(backend.clone()), Arc::new(clock.clone()), Duration::from_secs(300));
        (cache, backend)
    }

    fn ids() -> (TenantId, PrincipalId) {
        (TenantId::parse("t1").unwrap(), PrincipalId::parse("a.example.com").unwrap())
    }

    fn counters() -> Counters {
        [("products".to_owned(), Some(3)), ("orders".to_owned(), Some(9))].into_iter().collect()
    }

    #[test]
    fn test_cache_key_format() {
        let (tenant, shop) = ids();
        assert_eq!(cache_key(&tenant, &shop), b"stats:t1:a.example.com");
    }

    #[tokio::test]
    async fn test_put_then_get_until_expiry() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let (cache, _) = cache(&clock);
        let (tenant, shop) = ids();

        let written = cache.put(&tenant, &shop, counters()).await.unwrap();
        assert_eq!(written.expires_at.timestamp(), 1_700_000_300);

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(&tenant, &shop).await.unwrap(), Some(written));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&tenant, &shop).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_field_checked_even_if_backend_keeps_entry() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let (cache, backend) = cache(&clock);
        let (tenant, shop) = ids();

        let stale = CacheEntry {
            tenant_id: tenant.clone(),
            principal_id: shop.clone(),
            counters: counters(),
            fetched_at: clock.now(),
            expires_at: clock.now(),
        };
        backend.set(cache_key(&tenant, &shop), serde_json::to_vec(&stale).unwrap()).await.unwrap();

        assert!(cache.get(&tenant, &shop).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_error() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let (cache, backend) = cache(&clock);
        let (tenant, shop) = ids();
        backend.set(cache_key(&tenant, &shop), b"{not json".to_vec()).await.unwrap();

        assert!(matches!(cache.get(&tenant, &shop).await, Err(StorageError::Serialization { .. })));
    }

    #[tokio::test]
    async fn test_invalidate_idempotent() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let (cache, _) = cache(&clock);
        let (tenant, shop) = ids();
        cache.put(&tenant, &shop, counters()).await.unwrap();

        cache.invalidate(&tenant, &shop).await.unwrap();
        cache.invalidate(&tenant, &shop).await.unwrap();
        assert!(cache.get(&tenant, &shop).await.unwrap().is_none());
    }
}
