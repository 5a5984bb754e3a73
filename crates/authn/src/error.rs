//! Authentication error types.
//!
//! Every failure of bearer token verification, tenant resolution or the
//! install handshake maps onto [`AuthError`]. Callers at the HTTP edge render
//! all of them as a generic unauthorized response; the variant only feeds
//! logs and lets callers tell a wrong shop apart from a bad token.

use storelink_storage::StorageError;
use thiserror::Error;

/// Authentication errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The `Authorization` header is absent or lacks the `Bearer ` prefix.
    #[error("Missing bearer token")]
    MissingBearer,

    /// Malformed token: wrong segment count, bad base64 or bad JSON.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// The token audience names no registered tenant.
    #[error("Unknown tenant")]
    UnknownTenant,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Algorithm not in the accepted list.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Token not yet valid (`nbf` in the future).
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Audience does not equal the resolved tenant's public id.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// The destination claim has no usable host.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// The token is valid but was issued for a different shop than expected.
    #[error("Principal mismatch: expected {expected}, got {actual}")]
    PrincipalMismatch {
        /// The shop the caller asked for.
        expected: String,
        /// The shop the token was issued for.
        actual: String,
    },

    /// The handshake `state` value could not be decoded.
    #[error("Invalid correlation token: {0}")]
    InvalidCorrelationToken(String),

    /// Storage backend error while loading the tenant registry.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Registry storage error: {0}")]
    RegistryUnavailable(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidTokenFormat`].
    #[must_use]
    pub fn invalid_token_format(msg: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(msg.into())
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    #[must_use]
    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }

    /// Creates an [`AuthError::InvalidAudience`].
    #[must_use]
    pub fn invalid_audience(msg: impl Into<String>) -> Self {
        Self::InvalidAudience(msg.into())
    }

    /// Creates an [`AuthError::InvalidDestination`].
    #[must_use]
    pub fn invalid_destination(msg: impl Into<String>) -> Self {
        Self::InvalidDestination(msg.into())
    }

    /// Creates an [`AuthError::InvalidCorrelationToken`].
    #[must_use]
    pub fn invalid_correlation_token(msg: impl Into<String>) -> Self {
        Self::InvalidCorrelationToken(msg.into())
    }

    /// Returns `true` when the failure came from storage rather than the
    /// caller's credentials. Such failures are not the caller's fault and
    /// should not be rendered as unauthorized.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::RegistryUnavailable(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::RegistryUnavailable(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::unsupported_algorithm("Algorithm not supported")
            },
            _ => AuthError::invalid_token_format(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::invalid_token_format("test").to_string(), "Invalid token format: test");
        assert_eq!(AuthError::TokenExpired.to_string(), "Token expired");
        assert_eq!(
            AuthError::PrincipalMismatch { expected: "a.example.com".into(), actual: "b.example.com".into() }
                .to_string(),
            "Principal mismatch: expected a.example.com, got b.example.com"
        );
    }

    #[test]
    fn test_storage_error_preserves_source_chain() {
        let auth_err: AuthError = StorageError::connection("connection refused").into();
        assert!(auth_err.is_storage());

        let source = auth_err.source().expect("source exists");
        assert_eq!(source.to_string(), "Connection error: connection refused");
    }

    #[test]
    fn test_error_from_jsonwebtoken() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature);
        assert!(matches!(AuthError::from(jwt_err), AuthError::InvalidSignature));
    }
}
