//! Error types for merchant platform access.
//!
//! [`ApiError`] describes what a single HTTP exchange with the merchant
//! platform produced. [`MerchantError`] is what the vault and aggregator
//! surface to callers; it separates the conditions the frontend acts on
//! (reconnect, back off) from generic upstream failure.

use std::time::Duration;

use storelink_storage::StorageError;
use thiserror::Error;

/// Result type alias for merchant operations.
pub type Result<T> = std::result::Result<T, MerchantError>;

/// Outcome of a failed call to the merchant platform.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// HTTP 429.
    #[error("throttled by merchant platform")]
    Throttled {
        /// Parsed `Retry-After` hint, when the response carried one.
        retry_after: Option<Duration>,
    },

    /// HTTP 401 or 403: the access token is no longer accepted.
    #[error("credential rejected: HTTP {status}")]
    Unauthorized {
        /// The status code returned.
        status: u16,
    },

    /// Any other non-success status.
    #[error("merchant platform returned HTTP {status}")]
    Status {
        /// The status code returned.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Connection, TLS or timeout failure.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// The underlying client error.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The response body was not the expected JSON.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },
}

impl ApiError {
    /// Creates a [`Throttled`](Self::Throttled) error.
    #[must_use]
    pub fn throttled(retry_after: Option<Duration>) -> Self {
        Self::Throttled { retry_after }
    }

    /// Creates an [`Unauthorized`](Self::Unauthorized) error.
    #[must_use]
    pub fn unauthorized(status: u16) -> Self {
        Self::Unauthorized { status }
    }

    /// Creates a [`Status`](Self::Status) error.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status { status, body: body.into() }
    }

    /// Creates a [`Transport`](Self::Transport) error without a source.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Creates a [`Decode`](Self::Decode) error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Whether the call may succeed if repeated after a wait.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode { message: err.to_string() };
        }
        Self::Transport { message: err.to_string(), source: Some(err) }
    }
}

/// Errors surfaced by the credential vault and the stats aggregator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MerchantError {
    /// No credential is stored for this tenant and shop.
    #[error("shop {principal_id} is not connected for tenant {tenant_id}")]
    NotConnected {
        /// Tenant that was asked for.
        tenant_id: String,
        /// Shop that was asked for.
        principal_id: String,
    },

    /// The platform rejected the stored access token; a new install is needed.
    #[error("credential expired, reauthorization required (HTTP {status})")]
    CredentialExpired {
        /// The status code the platform returned.
        status: u16,
    },

    /// Still throttled after the retry budget was spent.
    #[error("rate limited after {attempts} attempts")]
    RateLimited {
        /// Calls made, including the first.
        attempts: u32,
        /// The last `Retry-After` hint seen.
        retry_after: Option<Duration>,
    },

    /// Generic upstream failure.
    #[error("upstream error: {0}")]
    Upstream(#[source] ApiError),

    /// The remote phase did not finish within its deadline.
    #[error("deadline of {deadline:?} exceeded")]
    DeadlineExceeded {
        /// The configured deadline.
        deadline: Duration,
    },

    /// A forwarded request was rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The secret store failed on a credential read or write.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl MerchantError {
    /// Creates a [`NotConnected`](Self::NotConnected) error.
    pub fn not_connected(tenant_id: impl ToString, principal_id: impl ToString) -> Self {
        Self::NotConnected { tenant_id: tenant_id.to_string(), principal_id: principal_id.to_string() }
    }

    /// Creates an [`InvalidRequest`](Self::InvalidRequest) error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Whether the frontend should restart the install handshake.
    #[must_use]
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::CredentialExpired { .. })
    }

    /// Retry hint for the caller, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<StorageError> for MerchantError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<ApiError> for MerchantError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { status } => Self::CredentialExpired { status },
            ApiError::Throttled { retry_after } => Self::RateLimited { attempts: 1, retry_after },
            other => Self::Upstream(other),
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric or duration field is below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Field name.
        field: &'static str,
        /// Minimum accepted value.
        min: String,
        /// Value supplied.
        value: String,
    },

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ApiError::unauthorized(401), true)]
    #[case(ApiError::unauthorized(403), true)]
    #[case(ApiError::status(500, "boom"), false)]
    #[case(ApiError::transport("reset"), false)]
    fn test_api_error_mapping(#[case] api: ApiError, #[case] reconnect: bool) {
        let err = MerchantError::from(api);
        assert_eq!(err.requires_reconnect(), reconnect);
    }

    #[test]
    fn test_throttled_maps_to_rate_limited() {
        let err = MerchantError::from(ApiError::throttled(Some(Duration::from_secs(4))));
        assert!(matches!(err, MerchantError::RateLimited { attempts: 1, .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_not_connected_requires_reconnect() {
        let err = MerchantError::not_connected("t1", "a.example.com");
        assert!(err.requires_reconnect());
        assert_eq!(err.to_string(), "shop a.example.com is not connected for tenant t1");
    }
}
