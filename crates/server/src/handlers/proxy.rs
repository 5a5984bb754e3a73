//! Signed app proxy forwarding.
//!
//! The platform signs proxied storefront requests with the proxy signature
//! style. A verified request is forwarded to the admin API with the shop's
//! stored credential.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use storelink_authn::{SignatureStyle, verify_callback};
use storelink_merchant::{MerchantError, Method, validate_endpoint};

use super::resolve_app;
use crate::{
    error::{ApiError, Result},
    state::AppState,
};

const DEFAULT_ENDPOINT: &str = "products.json";

/// JSON body of `POST /proxy/{tenant}`.
#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    /// Endpoint relative to the admin API root.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// HTTP method; `GET`, `POST`, `PUT` or `DELETE`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Optional JSON payload for write methods.
    #[serde(default)]
    pub body: Option<Value>,
}

impl Default for ProxyRequest {
    fn default() -> Self {
        Self { endpoint: default_endpoint(), method: default_method(), body: None }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_owned()
}

fn default_method() -> String {
    "GET".to_owned()
}

fn parse_method(raw: &str) -> Result<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        other => Err(ApiError::invalid("method", format!("'{other}' is not allowed"))),
    }
}

/// `POST /proxy/{tenant}?shop=&signature=...`.
///
/// # Errors
///
/// - 400 on missing parameters, a bad body, method or endpoint
/// - 403 on a bad signature
/// - 404 for an unknown app, 409 when the shop is not connected
#[tracing::instrument(name = "forward_proxy", skip_all, fields(tenant = %tenant, shop = ?params.get("shop")))]
pub async fn forward_proxy(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Result<Response> {
    let raw_shop = params.get("shop").filter(|s| !s.is_empty()).ok_or(ApiError::MissingParameter("shop"))?;
    let signature =
        params.get("signature").filter(|s| !s.is_empty()).ok_or(ApiError::MissingParameter("signature"))?;

    let app = resolve_app(&state, &tenant).await?;
    let pairs = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    if !verify_callback(pairs, signature, app.secret.as_bytes(), SignatureStyle::Proxy) {
        tracing::warn!(tenant_id = %app.tenant_id, "proxy signature rejected");
        return Err(ApiError::InvalidSignature);
    }

    let shop =
        state.install.parse_shop(raw_shop).ok_or_else(|| ApiError::invalid("shop", "not a valid shop domain"))?;

    let request = if body.is_empty() {
        ProxyRequest::default()
    } else {
        serde_json::from_slice::<ProxyRequest>(&body).map_err(|e| ApiError::invalid("body", e.to_string()))?
    };
    let endpoint = validate_endpoint(&request.endpoint)?;
    let method = parse_method(&request.method)?;

    let credential = state
        .vault
        .fetch(&app.tenant_id, &shop)
        .await
        .map_err(MerchantError::from)?
        .ok_or_else(|| MerchantError::not_connected(&app.tenant_id, &shop))?;

    let response = state
        .api
        .forward(&shop, &credential.access_token, method, endpoint, request.body.as_ref())
        .await
        .map_err(MerchantError::from)?;

    Ok(([(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(response)).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("DELETE").unwrap(), Method::DELETE);
        assert!(parse_method("PATCH").is_err());
        assert!(parse_method("CONNECT").is_err());
    }

    #[test]
    fn test_body_defaults() {
        let request: ProxyRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.endpoint, "products.json");
        assert_eq!(request.method, "GET");
        assert!(request.body.is_none());
    }
}
