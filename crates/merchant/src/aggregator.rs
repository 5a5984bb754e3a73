//! Cached statistics aggregation.
//!
//! A request walks these states:
//!
//! ```text
//! CacheCheck ──hit──────────────────────────────────────────▶ report (from_cache)
//!     │ miss / forced / cache error
//!     ▼
//! Fetch credential ──absent──▶ NotConnected
//!     ▼
//! RemoteCall (all counters concurrently, throttle retry each, one deadline)
//!     ▼
//! PartialFailure policy ──expired credential / all failed──▶ error
//!     ▼
//! CacheWrite (only when every counter resolved) ──────────────▶ report
//! ```
//!
//! Cache failures never fail a request. Credential storage failures do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use storelink_storage::{Clock, PrincipalId, StorageResult, TenantId};

use crate::{
    cache::{Counters, StatsCache},
    client::MerchantApi,
    config::StatsConfig,
    error::{ApiError, MerchantError, Result},
    retry::with_throttle_retry,
    vault::CredentialVault,
};

/// Aggregated counters for one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    /// Counter values; `None` for counters that failed this time.
    pub counters: Counters,
    /// When the values were fetched.
    pub fetched_at: DateTime<Utc>,
    /// Served from the cache without a remote call.
    pub from_cache: bool,
    /// Every counter resolved. `false` means the report is partial.
    pub success: bool,
}

/// Produces [`StatsReport`]s, reading through [`StatsCache`].
pub struct StatsAggregator {
    vault: Arc<CredentialVault>,
    cache: Arc<StatsCache>,
    api: Arc<dyn MerchantApi>,
    clock: Arc<dyn Clock>,
    config: StatsConfig,
}

impl std::fmt::Debug for StatsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsAggregator").field("config", &self.config).finish_non_exhaustive()
    }
}

impl StatsAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new(
        vault: Arc<CredentialVault>,
        cache: Arc<StatsCache>,
        api: Arc<dyn MerchantApi>,
        clock: Arc<dyn Clock>,
        config: StatsConfig,
    ) -> Self {
        Self { vault, cache, api, clock, config }
    }

    /// Returns the counters for `principal`, from cache unless
    /// `force_refresh` is set or the entry has expired.
    ///
    /// # Errors
    ///
    /// - [`MerchantError::NotConnected`] when no credential is stored
    /// - [`MerchantError::CredentialExpired`] when any counter is rejected
    ///   with 401/403
    /// - [`MerchantError::RateLimited`], [`MerchantError::Upstream`] when
    ///   every counter failed (the first failure is returned)
    /// - [`MerchantError::DeadlineExceeded`] when the remote phase overran
    /// - [`MerchantError::Storage`] when the credential could not be read
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant, principal_id = %principal))]
    pub async fn get_stats(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
        force_refresh: bool,
    ) -> Result<StatsReport> {
        if !force_refresh {
            match self.cache.get(tenant, principal).await {
                Ok(Some(entry)) => {
                    tracing::debug!("stats served from cache");
                    return Ok(StatsReport {
                        counters: entry.counters,
                        fetched_at: entry.fetched_at,
                        from_cache: true,
                        success: true,
                    });
                },
                Ok(None) => {},
                Err(e) => tracing::warn!(error = %e, "stats cache read failed, fetching live"),
            }
        }

        let credential = self
            .vault
            .fetch(tenant, principal)
            .await?
            .ok_or_else(|| MerchantError::not_connected(tenant, principal))?;

        let deadline = self.config.request_deadline;
        let results = tokio::time::timeout(deadline, self.fetch_counters(principal, &credential.access_token))
            .await
            .map_err(|_| MerchantError::DeadlineExceeded { deadline })?;

        let counters = settle(results)?;
        let success = counters.values().all(Option::is_some);

        let fetched_at = if success {
            match self.cache.put(tenant, principal, counters.clone()).await {
                Ok(entry) => entry.fetched_at,
                Err(e) => {
                    tracing::warn!(error = %e, "stats cache write failed");
                    self.clock.now()
                },
            }
        } else {
            tracing::warn!(
                failed = counters.values().filter(|v| v.is_none()).count(),
                "partial stats, cache left untouched"
            );
            self.clock.now()
        };

        Ok(StatsReport { counters, fetched_at, from_cache: false, success })
    }

    /// Drops the cached entry for `principal`.
    ///
    /// # Errors
    ///
    /// Returns the cache backend error.
    pub async fn invalidate(&self, tenant: &TenantId, principal: &PrincipalId) -> StorageResult<()> {
        self.cache.invalidate(tenant, principal).await
    }

    async fn fetch_counters(
        &self,
        principal: &PrincipalId,
        access_token: &str,
    ) -> Vec<(String, Result<i64>)> {
        let calls = self.config.counters.iter().map(|(name, endpoint)| async move {
            let result = with_throttle_retry(&self.config.retry, name, || {
                self.api.get_json(principal, access_token, endpoint)
            })
            .await
            .and_then(|body| {
                body.get("count").and_then(serde_json::Value::as_i64).ok_or_else(|| {
                    MerchantError::Upstream(ApiError::decode(format!("{endpoint}: response has no integer count")))
                })
            });

            if let Err(e) = &result {
                tracing::debug!(counter = %name, error = %e, "counter fetch failed");
            }
            (name.clone(), result)
        });

        join_all(calls).await
    }
}

/// Applies the partial-failure policy to per-counter results.
fn settle(results: Vec<(String, Result<i64>)>) -> Result<Counters> {
    let mut counters = Counters::new();
    let mut first_error = None;
    let mut any_success = false;

    for (name, result) in results {
        match result {
            Ok(value) => {
                any_success = true;
                counters.insert(name, Some(value));
            },
            Err(e @ MerchantError::CredentialExpired { .. }) => return Err(e),
            Err(e) => {
                first_error.get_or_insert(e);
                counters.insert(name, None);
            },
        }
    }

    match first_error {
        Some(e) if !any_success => Err(e),
        _ => Ok(counters),
    }
}
