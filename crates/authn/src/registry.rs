//! Tenant app registry with a snapshot cache.
//!
//! [`AppRegistry`] loads every registered app from the secret store into an
//! immutable [`Snapshot`] indexed by public id and by tenant id. The snapshot
//! is served for a freshness window measured on the injected [`Clock`];
//! after that the next caller reloads it.
//!
//! # Refresh behaviour
//!
//! - With no snapshot yet, the caller loads synchronously and storage errors propagate.
//! - With a stale snapshot, one caller reloads while concurrent callers keep
//!   reading the stale snapshot. Readers never wait on a reload.
//! - A failed reload logs a warning and keeps serving the stale snapshot.
//!
//! The snapshot is a soft cache: the secret store remains the source of
//! truth and [`AppRegistry::invalidate`] can drop the snapshot at any time.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use storelink_storage::{
    AppField, Clock, SecretNamespace, SecretStore, SecretValue, StorageError, StorageResult,
    TenantId, Zeroizing,
};

use crate::tenant::{AppStatus, TenantApp};

/// Default snapshot freshness window.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(300);

/// Registry tuning.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How long a loaded snapshot is served before the next reload.
    #[builder(default = DEFAULT_FRESHNESS)]
    #[serde(with = "humantime_serde", default = "default_freshness")]
    pub freshness: Duration,
}

fn default_freshness() -> Duration {
    DEFAULT_FRESHNESS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { freshness: DEFAULT_FRESHNESS }
    }
}

/// Lookup seam used by the token and handshake verifiers.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Resolves an app by its public client id (the token audience).
    async fn resolve_by_public_id(&self, public_id: &str) -> StorageResult<Option<Arc<TenantApp>>>;

    /// Resolves an app by its internal tenant id.
    async fn resolve_by_tenant_id(&self, tenant: &TenantId) -> StorageResult<Option<Arc<TenantApp>>>;
}

/// An immutable view of every registered app.
#[derive(Debug)]
pub struct Snapshot {
    by_public_id: HashMap<String, Arc<TenantApp>>,
    by_tenant: HashMap<TenantId, Arc<TenantApp>>,
    loaded_at: DateTime<Utc>,
}

impl Snapshot {
    /// Number of apps in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_tenant.len()
    }

    /// Returns `true` when no apps are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_tenant.is_empty()
    }

    /// When the snapshot was loaded.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Resets the refresh flag even if the reload future is dropped mid-flight.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registry of tenant apps backed by a [`SecretStore`].
pub struct AppRegistry {
    store: Arc<dyn SecretStore>,
    namespace: SecretNamespace,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refreshing: AtomicBool,
    generation: AtomicU64,
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRegistry")
            .field("namespace", &self.namespace)
            .field("freshness", &self.freshness)
            .field("loaded", &self.snapshot.read().is_some())
            .finish_non_exhaustive()
    }
}

impl AppRegistry {
    /// Creates a registry with the default freshness window.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, namespace: SecretNamespace, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, namespace, clock, &RegistryConfig::default())
    }

    /// Creates a registry with explicit tuning.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn SecretStore>,
        namespace: SecretNamespace,
        clock: Arc<dyn Clock>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            store,
            namespace,
            clock,
            freshness: config.freshness,
            snapshot: RwLock::new(None),
            refreshing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolves an app by public id. Unknown ids are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] only when no snapshot exists and the
    /// initial load fails.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_by_public_id(&self, public_id: &str) -> StorageResult<Option<Arc<TenantApp>>> {
        let snapshot = self.current().await?;
        Ok(snapshot.by_public_id.get(public_id).cloned())
    }

    /// Resolves an app by tenant id. Unknown ids are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Same as [`resolve_by_public_id`](Self::resolve_by_public_id).
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn resolve_by_tenant_id(&self, tenant: &TenantId) -> StorageResult<Option<Arc<TenantApp>>> {
        let snapshot = self.current().await?;
        Ok(snapshot.by_tenant.get(tenant).cloned())
    }

    /// Drops the snapshot so the next lookup reloads from storage.
    ///
    /// A reload already in flight when this is called still answers its own
    /// caller but does not install its result.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.snapshot.write() = None;
        tracing::debug!("tenant registry snapshot invalidated");
    }

    /// Persists a status change for a registered app.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the tenant is not registered,
    /// or the underlying storage error.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn set_status(&self, tenant: &TenantId, status: AppStatus) -> StorageResult<()> {
        let client_id = self.namespace.app_field(tenant, AppField::ClientId);
        if self.store.get(&client_id).await?.is_none() {
            return Err(StorageError::not_found(client_id.as_str()));
        }

        let path = self.namespace.app_field(tenant, AppField::Status);
        self.store.put(&path, SecretValue::plain(status.as_str())).await?;
        self.invalidate();

        tracing::info!(
            audit.action = "set_app_status",
            audit.resource = %format_args!("tenant:{tenant}"),
            audit.result = "success",
            status = %status,
            "audit_event"
        );
        Ok(())
    }

    /// Writes a complete app registration in one transaction.
    ///
    /// Registration is owned by the operator tooling; this exists so
    /// bootstrap code and tests can seed the store.
    ///
    /// # Errors
    ///
    /// Returns the underlying storage error; nothing is written in that case.
    #[tracing::instrument(skip(self, app), fields(tenant_id = %app.tenant_id))]
    pub async fn register_app(&self, app: &TenantApp) -> StorageResult<()> {
        let ns = &self.namespace;
        let tenant = &app.tenant_id;
        self.store
            .put_all(vec![
                (ns.app_field(tenant, AppField::ClientId), SecretValue::plain(app.public_id.clone())),
                (
                    ns.app_field(tenant, AppField::ClientSecret),
                    SecretValue::Encrypted(app.secret.clone()),
                ),
                (
                    ns.app_field(tenant, AppField::DisplayName),
                    SecretValue::plain(app.display_name.clone()),
                ),
                (ns.app_field(tenant, AppField::Status), SecretValue::plain(app.status.as_str())),
            ])
            .await?;
        self.invalidate();

        tracing::info!(
            audit.action = "register_app",
            audit.resource = %format_args!("tenant:{tenant}"),
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        let age = self.clock.now().signed_duration_since(snapshot.loaded_at);
        age.to_std().map(|age| age < self.freshness).unwrap_or(true)
    }

    async fn current(&self) -> StorageResult<Arc<Snapshot>> {
        let existing = self.snapshot.read().clone();

        let Some(stale) = existing else {
            tracing::debug!("no tenant registry snapshot; loading");
            return self.reload().await;
        };

        if self.is_fresh(&stale) {
            return Ok(stale);
        }

        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("tenant registry refresh in progress; serving stale snapshot");
            return Ok(stale);
        }
        let _guard = RefreshGuard(&self.refreshing);

        match self.reload().await {
            Ok(fresh) => Ok(fresh),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    snapshot_age_secs = self.clock.now().signed_duration_since(stale.loaded_at).num_seconds(),
                    "tenant registry refresh failed; serving stale snapshot"
                );
                Ok(stale)
            },
        }
    }

    async fn reload(&self) -> StorageResult<Arc<Snapshot>> {
        let generation = self.generation.load(Ordering::Acquire);
        let snapshot = Arc::new(self.load().await?);

        if self.generation.load(Ordering::Acquire) == generation {
            *self.snapshot.write() = Some(Arc::clone(&snapshot));
        } else {
            tracing::debug!("discarding registry load: invalidation occurred during fetch");
        }
        Ok(snapshot)
    }

    #[tracing::instrument(skip(self))]
    async fn load(&self) -> StorageResult<Snapshot> {
        let apps_root = self.namespace.apps();
        let entries = self.store.list(&apps_root).await?;

        #[derive(Default)]
        struct Partial {
            client_id: Option<String>,
            secret: Option<Zeroizing<String>>,
            display_name: Option<String>,
            status: Option<String>,
        }

        let mut partials: BTreeMap<String, Partial> = BTreeMap::new();
        for (path, secret) in entries {
            let Some(rest) = path.relative_to(&apps_root) else { continue };
            let [tenant, field] = rest.as_slice() else { continue };
            let Some(field) = AppField::from_component(field) else { continue };

            let partial = partials.entry((*tenant).to_owned()).or_default();
            match field {
                AppField::ClientId => partial.client_id = Some(secret.expose().to_owned()),
                AppField::ClientSecret => partial.secret = Some(secret.into_inner()),
                AppField::DisplayName => partial.display_name = Some(secret.expose().to_owned()),
                AppField::Status => partial.status = Some(secret.expose().to_owned()),
            }
        }

        let mut by_public_id = HashMap::new();
        let mut by_tenant = HashMap::new();
        for (raw_tenant, partial) in partials {
            let Ok(tenant_id) = TenantId::parse(&raw_tenant) else {
                tracing::warn!(tenant = %raw_tenant, "skipping app with invalid tenant id");
                continue;
            };
            let (Some(public_id), Some(secret)) = (partial.client_id, partial.secret) else {
                tracing::warn!(tenant_id = %tenant_id, "skipping app without client id or secret");
                continue;
            };
            let status = match partial.status.as_deref().map(str::parse::<AppStatus>) {
                None => AppStatus::default(),
                Some(Ok(status)) => status,
                Some(Err(err)) => {
                    tracing::warn!(tenant_id = %tenant_id, error = %err, "defaulting app status");
                    AppStatus::default()
                },
            };

            let app = Arc::new(TenantApp {
                display_name: partial.display_name.unwrap_or_else(|| tenant_id.to_string()),
                tenant_id: tenant_id.clone(),
                public_id: public_id.clone(),
                secret,
                status,
            });

            if by_public_id.contains_key(&public_id) {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    public_id = %public_id,
                    "duplicate public id; keeping the first registration"
                );
                continue;
            }
            by_public_id.insert(public_id, Arc::clone(&app));
            by_tenant.insert(tenant_id, app);
        }

        tracing::debug!(apps = by_tenant.len(), "tenant registry loaded");
        Ok(Snapshot { by_public_id, by_tenant, loaded_at: self.clock.now() })
    }
}

#[async_trait]
impl TenantResolver for AppRegistry {
    async fn resolve_by_public_id(&self, public_id: &str) -> StorageResult<Option<Arc<TenantApp>>> {
        AppRegistry::resolve_by_public_id(self, public_id).await
    }

    async fn resolve_by_tenant_id(&self, tenant: &TenantId) -> StorageResult<Option<Arc<TenantApp>>> {
        AppRegistry::resolve_by_tenant_id(self, tenant).await
    }
}
