//! Shared test utilities for authentication testing.
//!
//! Helpers for minting HS256 session tokens, crafting raw (possibly
//! hostile) token strings and seeding an [`AppRegistry`] over an in-memory
//! store. Feature-gated behind `testutil` so it never reaches production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! storelink-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use storelink_authn::testutil::{session_claims, sign_claims};
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use storelink_storage::{
    BackendSecretStore, Clock, SecretNamespace, SecretStore, TenantId, Zeroizing,
    testutil::{FaultyBackend, test_cipher},
};

use crate::{
    jwt::SessionClaims,
    registry::AppRegistry,
    tenant::{AppStatus, TenantApp},
};

/// Namespace root used by the seeded registries.
pub const TEST_NAMESPACE: &str = "storelink";

/// Signs `claims` with HS256 under `secret`.
///
/// # Panics
///
/// Panics if JWT encoding fails (should not happen with valid inputs).
pub fn sign_claims(claims: &SessionClaims, secret: &[u8]) -> String {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret))
        .expect("Failed to encode test JWT")
}

/// Creates a raw token string from arbitrary header and payload JSON.
///
/// The signature segment is taken verbatim, which makes this useful for
/// algorithm confusion and tampering tests.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value, signature: &str) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.{signature}")
}

/// Claims for a session on `shop` addressed to `audience`, valid for one
/// minute from `now` (Unix seconds).
pub fn session_claims(audience: &str, shop: &str, now: i64) -> SessionClaims {
    SessionClaims {
        iss: format!("https://{shop}/admin"),
        dest: format!("https://{shop}"),
        aud: audience.to_owned(),
        sub: "42".to_owned(),
        exp: now + 60,
        nbf: Some(now - 5),
        iat: Some(now - 5),
        jti: Some(format!("jti-{audience}-{now}")),
        sid: Some("session-1".to_owned()),
    }
}

/// An active app whose secret is `"{tenant}-secret"`.
///
/// # Panics
///
/// Panics if `tenant` is not a valid tenant id.
pub fn test_app(tenant: &str, public_id: &str) -> TenantApp {
    TenantApp {
        tenant_id: TenantId::parse(tenant).expect("valid tenant id"),
        public_id: public_id.to_owned(),
        secret: Zeroizing::new(format!("{tenant}-secret")),
        display_name: format!("{tenant} app"),
        status: AppStatus::Active,
    }
}

/// A registry seeded with `apps`, together with the store and the faulty
/// backend underneath so tests can inject failures.
pub struct SeededRegistry {
    /// The registry under test.
    pub registry: Arc<AppRegistry>,
    /// Secret store backing the registry.
    pub store: Arc<dyn SecretStore>,
    /// Backend with failure switches.
    pub backend: FaultyBackend,
    /// Namespace the apps were written under.
    pub namespace: SecretNamespace,
}

/// Builds an encrypted in-memory store, registers `apps` and returns the
/// registry reading from it.
///
/// # Panics
///
/// Panics if registration fails.
pub async fn seeded_registry(apps: &[TenantApp], clock: Arc<dyn Clock>) -> SeededRegistry {
    let backend = FaultyBackend::new();
    let store: Arc<dyn SecretStore> = Arc::new(BackendSecretStore::new(backend.clone(), test_cipher()));
    let namespace = SecretNamespace::new(TEST_NAMESPACE).expect("valid namespace");
    let registry = Arc::new(AppRegistry::new(Arc::clone(&store), namespace.clone(), clock));

    for app in apps {
        registry.register_app(app).await.expect("register test app");
    }

    SeededRegistry { registry, store, backend, namespace }
}

/// Asserts that a [`Result<T, AuthError>`](crate::AuthError) is an `Err`
/// matching the given variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use storelink_authn::assert_auth_error;
/// use storelink_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::TokenExpired);
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::AuthError;

    #[test]
    fn test_craft_raw_jwt_keeps_signature() {
        let jwt = craft_raw_jwt(&json!({"alg": "none"}), &json!({"sub": "test"}), "");
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty());
    }

    #[test]
    fn test_sign_claims_produces_three_part_token() {
        let jwt = sign_claims(&session_claims("pub-1", "a.example.com", 1_000), b"k");
        assert_eq!(jwt.split('.').count(), 3);
    }

    #[test]
    fn test_assert_auth_error_unit_variant() {
        let result: Result<(), AuthError> = Err(AuthError::TokenExpired);
        assert_auth_error!(result, TokenExpired);
    }

    #[test]
    fn test_assert_auth_error_struct_variant() {
        let result: Result<(), AuthError> =
            Err(AuthError::PrincipalMismatch { expected: "a".into(), actual: "b".into() });
        assert_auth_error!(result, PrincipalMismatch, "principals differ");
    }
}
