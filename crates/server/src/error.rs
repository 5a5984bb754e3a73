//! HTTP error rendering.
//!
//! Every handler returns [`ApiError`]; its [`IntoResponse`] impl is the
//! single place where core errors become status codes. Authentication
//! failures never leak their cause to the caller.

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use storelink_authn::AuthError;
use storelink_merchant::MerchantError;
use storelink_storage::StorageError;
use thiserror::Error;

/// Request failure as seen by the HTTP edge.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// A required parameter is absent.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// A parameter is present but unusable.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// No app is registered under the requested tenant.
    #[error("unknown app")]
    UnknownApp,

    /// Handshake or proxy signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The handshake `state` does not match the state cookie.
    #[error("handshake state mismatch")]
    StateMismatch,

    /// Webhook HMAC header missing or wrong.
    #[error("invalid webhook signature")]
    InvalidWebhookSignature,

    /// Webhook topic this service does not handle.
    #[error("unsupported webhook topic: {0}")]
    UnsupportedTopic(String),

    /// Bearer token verification failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Stats or forwarding failed.
    #[error(transparent)]
    Merchant(#[from] MerchantError),

    /// The platform refused the authorization code.
    #[error("code exchange failed: {0}")]
    ExchangeFailed(#[source] storelink_merchant::ApiError),

    /// Secret storage failed.
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Creates an [`ApiError::InvalidParameter`].
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }

    /// Status code this error renders as.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) | Self::InvalidParameter { .. } | Self::UnsupportedTopic(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::UnknownApp => StatusCode::NOT_FOUND,
            Self::InvalidSignature | Self::StateMismatch => StatusCode::FORBIDDEN,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::Auth(e) if e.is_storage() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Merchant(e) => merchant_status(e),
            Self::ExchangeFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::Auth(e) if e.is_storage() => json!({ "error": "service_unavailable" }),
            Self::Auth(_) => json!({ "error": "unauthorized" }),
            Self::Merchant(MerchantError::NotConnected { .. }) => {
                json!({ "error": "not_connected", "reconnect": true })
            },
            Self::Merchant(MerchantError::CredentialExpired { .. }) => {
                json!({ "error": "reauthorization_required", "reconnect": true })
            },
            Self::Merchant(MerchantError::RateLimited { .. }) => json!({ "error": "rate_limited" }),
            Self::Merchant(MerchantError::DeadlineExceeded { .. }) => json!({ "error": "upstream_timeout" }),
            Self::Merchant(MerchantError::InvalidRequest(reason)) => {
                json!({ "error": "invalid_request", "message": reason })
            },
            Self::Merchant(MerchantError::Storage(_)) | Self::Storage(_) => {
                json!({ "error": "service_unavailable" })
            },
            Self::Merchant(_) => json!({ "error": "upstream_error" }),
            Self::ExchangeFailed(_) => json!({ "error": "install_failed" }),
            Self::MissingParameter(name) => {
                json!({ "error": "missing_parameter", "message": format!("missing {name}") })
            },
            Self::InvalidParameter { name, reason } => {
                json!({ "error": "invalid_parameter", "message": format!("{name}: {reason}") })
            },
            Self::UnknownApp => json!({ "error": "unknown_app" }),
            Self::InvalidSignature | Self::StateMismatch | Self::InvalidWebhookSignature => {
                json!({ "error": "invalid_signature" })
            },
            Self::UnsupportedTopic(topic) => json!({ "error": "unsupported_topic", "topic": topic }),
        }
    }
}

fn merchant_status(err: &MerchantError) -> StatusCode {
    match err {
        MerchantError::NotConnected { .. } => StatusCode::CONFLICT,
        MerchantError::CredentialExpired { .. } => StatusCode::UNAUTHORIZED,
        MerchantError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        MerchantError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        MerchantError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        MerchantError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// `Retry-After` in whole seconds, rounded up, at least 1.
fn retry_after_secs(hint: Option<Duration>) -> u64 {
    hint.map_or(1, |d| d.as_secs() + u64::from(d.subsec_nanos() > 0)).max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut response = (status, Json(self.body())).into_response();
        if let Self::Merchant(e @ MerchantError::RateLimited { .. }) = &self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs(e.retry_after()).to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
