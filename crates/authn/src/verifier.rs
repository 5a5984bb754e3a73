//! Bearer token verification against the tenant registry.

use std::{sync::Arc, time::Duration};

use storelink_storage::{Clock, PrincipalId, TenantId};
use url::Url;

use crate::{
    error::AuthError,
    jwt::{peek_audience, validate_claims, verify_token},
    registry::TenantResolver,
};

const BEARER_PREFIX: &str = "Bearer ";

/// Identity extracted from a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// Tenant the token was issued for.
    pub tenant_id: TenantId,
    /// Shop the session belongs to (host of the `dest` claim).
    pub principal_id: PrincipalId,
    /// The tenant's public client id (the token audience).
    pub public_id: String,
    /// The `sub` claim.
    pub subject: String,
    /// The `sid` claim, when present.
    pub session_id: Option<String>,
}

/// Verifies `Authorization: Bearer` session tokens.
///
/// Stateless apart from the resolver's soft cache; share one instance
/// across all requests.
pub struct TokenVerifier {
    resolver: Arc<dyn TenantResolver>,
    clock: Arc<dyn Clock>,
    leeway: Duration,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").field("leeway", &self.leeway).finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Creates a verifier with zero clock leeway.
    #[must_use]
    pub fn new(resolver: Arc<dyn TenantResolver>, clock: Arc<dyn Clock>) -> Self {
        Self { resolver, clock, leeway: Duration::ZERO }
    }

    /// Tolerates this much clock skew on `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Verifies the raw `Authorization` header value.
    ///
    /// Checks run in this order: bearer prefix, segment count, audience
    /// lookup, algorithm and signature, expiry and not-before, audience
    /// equality, destination host, expected principal.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] for the first failed check. A registry
    /// storage failure is reported as [`AuthError::RegistryUnavailable`].
    #[tracing::instrument(skip_all, fields(expected_principal = ?expected_principal.map(PrincipalId::as_str)))]
    pub async fn verify(
        &self,
        bearer_header: Option<&str>,
        expected_principal: Option<&PrincipalId>,
    ) -> Result<TenantContext, AuthError> {
        let token = bearer_header
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingBearer)?;

        let audience = peek_audience(token)?;

        let app = self
            .resolver
            .resolve_by_public_id(&audience)
            .await?
            .ok_or(AuthError::UnknownTenant)?;

        let claims = verify_token(token, app.secret.as_bytes())?;
        validate_claims(&claims, self.clock.now(), self.leeway)?;

        if claims.aud != app.public_id {
            return Err(AuthError::invalid_audience(format!(
                "expected '{}', got '{}'",
                app.public_id, claims.aud
            )));
        }

        let principal_id = principal_from_destination(&claims.dest)?;

        if let Some(expected) = expected_principal
            && expected != &principal_id
        {
            return Err(AuthError::PrincipalMismatch {
                expected: expected.to_string(),
                actual: principal_id.to_string(),
            });
        }

        tracing::debug!(
            tenant_id = %app.tenant_id,
            principal_id = %principal_id,
            "session token verified"
        );

        Ok(TenantContext {
            tenant_id: app.tenant_id.clone(),
            principal_id,
            public_id: app.public_id.clone(),
            subject: claims.sub,
            session_id: claims.sid,
        })
    }
}

/// Extracts the principal from a `dest` claim such as `https://a.example.com`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidDestination`] when the value is not a URL
/// with a valid DNS host.
pub fn principal_from_destination(dest: &str) -> Result<PrincipalId, AuthError> {
    let url = Url::parse(dest).map_err(|e| AuthError::invalid_destination(format!("{dest}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| AuthError::invalid_destination(format!("{dest}: no host")))?;
    PrincipalId::parse(host).map_err(|e| AuthError::invalid_destination(e.to_string()))
}
