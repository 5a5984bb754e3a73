//! Shared handler state.

use std::sync::Arc;

use anyhow::{Context, Result};
use storelink_authn::{AppRegistry, TenantResolver, TokenVerifier};
use storelink_merchant::{CredentialVault, HttpMerchantClient, MerchantApi, StatsAggregator, StatsCache};
use storelink_storage::{
    BackendSecretStore, Clock, MemoryBackend, SecretCipher, SecretNamespace, SecretStore, StorageBackend,
    system_clock,
};

use crate::config::{Config, InstallConfig};

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Install handshake settings.
    pub install: Arc<InstallConfig>,
    /// Tenant app registry.
    pub registry: Arc<AppRegistry>,
    /// Session token verifier.
    pub verifier: Arc<TokenVerifier>,
    /// Per-shop credentials.
    pub vault: Arc<CredentialVault>,
    /// Cached stats.
    pub aggregator: Arc<StatsAggregator>,
    /// Merchant platform client.
    pub api: Arc<dyn MerchantApi>,
    /// Secret store, for readiness checks.
    pub store: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("install", &self.install).finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the core components over explicit backends.
    ///
    /// `store` must be the store behind `registry`.
    ///
    /// # Errors
    ///
    /// Fails when the configured namespace is not a valid path.
    pub fn from_parts(
        config: &Config,
        registry: Arc<AppRegistry>,
        store: Arc<dyn SecretStore>,
        cache_backend: Arc<dyn StorageBackend>,
        api: Arc<dyn MerchantApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let namespace = SecretNamespace::new(config.namespace.clone()).context("invalid namespace")?;
        let resolver: Arc<dyn TenantResolver> = registry.clone();
        let verifier = Arc::new(TokenVerifier::new(resolver, Arc::clone(&clock)).with_leeway(config.token_leeway));
        let vault = Arc::new(CredentialVault::new(Arc::clone(&store), namespace, Arc::clone(&clock)));
        let cache = Arc::new(StatsCache::new(cache_backend, Arc::clone(&clock), config.stats.cache_ttl));
        let aggregator = Arc::new(StatsAggregator::new(
            Arc::clone(&vault),
            cache,
            Arc::clone(&api),
            clock,
            config.stats.clone(),
        ));

        Ok(Self { install: Arc::new(config.install.clone()), registry, verifier, vault, aggregator, api, store })
    }

    /// Builds the production state: encrypted in-memory secret store,
    /// in-memory TTL cache, HTTP merchant client and the system clock.
    /// Apps listed in the configuration are registered.
    ///
    /// # Errors
    ///
    /// Fails without an encryption key, on an invalid configuration value or
    /// when seeding the registry fails.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .encryption_key
            .as_deref()
            .context("STORELINK_ENCRYPTION_KEY is required (base64 of 32 bytes)")?;
        let cipher = SecretCipher::from_base64(key).context("invalid encryption key")?;
        let clock = system_clock();

        let store: Arc<dyn SecretStore> = Arc::new(BackendSecretStore::new(MemoryBackend::new(), cipher));
        let namespace = SecretNamespace::new(config.namespace.clone()).context("invalid namespace")?;
        let registry = Arc::new(AppRegistry::with_config(
            Arc::clone(&store),
            namespace,
            Arc::clone(&clock),
            &config.registry,
        ));
        for seed in &config.apps {
            registry.register_app(&seed.to_tenant_app()?).await.context("failed to register app")?;
        }

        let cache_backend = Arc::new(MemoryBackend::with_clock(Arc::clone(&clock)));
        let api = Arc::new(HttpMerchantClient::new(config.client.clone()).context("invalid client configuration")?);

        Self::from_parts(config, registry, store, cache_backend, api, clock)
    }
}
