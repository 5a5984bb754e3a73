//! Per-tenant, per-shop access credentials.
//!
//! A credential is three secret-store entries under
//! `{root}/shops/{tenant}/{shop}/`: the encrypted access token, the granted
//! scopes (comma-joined) and the install time (RFC 3339). Writes and
//! deletes go through one transaction so the three never disagree.

use std::{collections::BTreeSet, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use storelink_storage::{
    Clock, PrincipalId, SecretNamespace, SecretStore, SecretValue, ShopField, StorageResult, TenantId,
    Zeroizing,
};

/// A stored shop credential.
#[derive(Clone, PartialEq, Eq)]
pub struct PrincipalCredential {
    /// Tenant the shop installed.
    pub tenant_id: TenantId,
    /// The shop.
    pub principal_id: PrincipalId,
    /// Offline access token.
    pub access_token: Zeroizing<String>,
    /// Granted scopes.
    pub scopes: BTreeSet<String>,
    /// When the install completed.
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for PrincipalCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalCredential")
            .field("tenant_id", &self.tenant_id)
            .field("principal_id", &self.principal_id)
            .field("access_token", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Credential storage on top of a [`SecretStore`].
pub struct CredentialVault {
    store: Arc<dyn SecretStore>,
    namespace: SecretNamespace,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault").field("namespace", &self.namespace).finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Creates a vault writing under `namespace`.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, namespace: SecretNamespace, clock: Arc<dyn Clock>) -> Self {
        Self { store, namespace, clock }
    }

    /// Stores (or replaces) the credential for `principal`.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the transaction fails; nothing is
    /// written in that case.
    #[tracing::instrument(skip(self, access_token, scopes), fields(tenant_id = %tenant, principal_id = %principal))]
    pub async fn store(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
        access_token: Zeroizing<String>,
        scopes: &BTreeSet<String>,
    ) -> StorageResult<PrincipalCredential> {
        let issued_at = self.clock.now();
        let ns = &self.namespace;
        let joined = scopes.iter().map(String::as_str).collect::<Vec<_>>().join(",");

        self.store
            .put_all(vec![
                (
                    ns.shop_field(tenant, principal, ShopField::AccessToken),
                    SecretValue::Encrypted(access_token.clone()),
                ),
                (ns.shop_field(tenant, principal, ShopField::Scopes), SecretValue::plain(joined)),
                (
                    ns.shop_field(tenant, principal, ShopField::InstalledAt),
                    SecretValue::plain(issued_at.to_rfc3339()),
                ),
            ])
            .await?;

        tracing::info!(
            audit.action = "store_credential",
            audit.resource = %format_args!("tenant:{tenant}/shop:{principal}"),
            audit.result = "success",
            "audit_event"
        );

        Ok(PrincipalCredential {
            tenant_id: tenant.clone(),
            principal_id: principal.clone(),
            access_token,
            scopes: scopes.clone(),
            issued_at,
        })
    }

    /// Loads the credential for `principal`.
    ///
    /// Returns `Ok(None)` when no access token is stored. Missing scopes
    /// or install time degrade to empty and the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns the storage error on read or decryption failure.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant, principal_id = %principal))]
    pub async fn fetch(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
    ) -> StorageResult<Option<PrincipalCredential>> {
        let shop = self.namespace.shop(tenant, principal);
        let entries = self.store.list(&shop).await?;

        let mut access_token = None;
        let mut scopes = None;
        let mut installed_at = None;
        for (path, secret) in entries {
            match path.file_name() {
                name if name == ShopField::AccessToken.as_str() => access_token = Some(secret.into_inner()),
                name if name == ShopField::Scopes.as_str() => scopes = Some(secret),
                name if name == ShopField::InstalledAt.as_str() => installed_at = Some(secret),
                _ => {},
            }
        }

        let Some(access_token) = access_token else {
            return Ok(None);
        };

        let scopes = match scopes {
            Some(raw) => raw.expose().split(',').filter(|s| !s.is_empty()).map(str::to_owned).collect(),
            None => {
                tracing::warn!("credential has no scopes entry");
                BTreeSet::new()
            },
        };

        let issued_at = installed_at
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.expose()).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(|| {
                tracing::warn!("credential has no readable install time");
                DateTime::<Utc>::UNIX_EPOCH
            });

        Ok(Some(PrincipalCredential {
            tenant_id: tenant.clone(),
            principal_id: principal.clone(),
            access_token,
            scopes,
            issued_at,
        }))
    }

    /// Deletes the credential for `principal`. Deleting an absent
    /// credential succeeds.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the transaction fails.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant, principal_id = %principal))]
    pub async fn delete(&self, tenant: &TenantId, principal: &PrincipalId) -> StorageResult<()> {
        let paths: Vec<_> =
            ShopField::ALL.iter().map(|field| self.namespace.shop_field(tenant, principal, *field)).collect();
        self.store.delete_all(&paths).await?;

        tracing::info!(
            audit.action = "delete_credential",
            audit.resource = %format_args!("tenant:{tenant}/shop:{principal}"),
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Removes everything stored for `principal`, including entries this
    /// crate does not know about. Used for shop redaction.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the delete fails.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant, principal_id = %principal))]
    pub async fn purge_principal(&self, tenant: &TenantId, principal: &PrincipalId) -> StorageResult<()> {
        self.store.delete_prefix(&self.namespace.shop(tenant, principal)).await?;

        tracing::info!(
            audit.action = "purge_principal",
            audit.resource = %format_args!("tenant:{tenant}/shop:{principal}"),
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Shops with at least one stored entry for `tenant`, in order.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the listing fails.
    pub async fn list_principals(&self, tenant: &TenantId) -> StorageResult<Vec<PrincipalId>> {
        let shops = self.namespace.shops(tenant);
        let entries = self.store.list(&shops).await?;

        let mut principals = BTreeSet::new();
        for (path, _) in &entries {
            let Some(first) = path.relative_to(&shops).and_then(|rest| rest.first().copied()) else {
                continue;
            };
            match PrincipalId::parse(first) {
                Ok(principal) => {
                    principals.insert(principal);
                },
                Err(e) => tracing::warn!(path = %path.as_str(), error = %e, "skipping unexpected shop entry"),
            }
        }
        Ok(principals.into_iter().collect())
    }
}
