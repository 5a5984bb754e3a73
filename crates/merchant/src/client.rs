//! Merchant platform API client.
//!
//! [`MerchantApi`] is the seam between this crate and the remote platform;
//! [`HttpMerchantClient`] is the reqwest implementation. Requests go to
//! `https://{shop}/admin/api/{version}/{endpoint}` with the shop's access
//! token in `X-Shopify-Access-Token`. Status codes are classified into
//! [`ApiError`] here so callers never look at raw responses.

use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Response, StatusCode, header::RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;
use storelink_storage::{PrincipalId, Zeroizing};
use url::Url;

use crate::{
    config::ClientConfig,
    error::{ApiError, ConfigError, MerchantError},
};

/// Header carrying the shop access token.
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

const MAX_ERROR_BODY: usize = 1024;

/// Result of a successful authorization-code exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Offline access token for the shop.
    pub access_token: Zeroizing<String>,
    /// Scopes the merchant granted.
    pub scopes: BTreeSet<String>,
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("access_token", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Operations this system performs against the merchant platform.
#[async_trait]
pub trait MerchantApi: Send + Sync {
    /// Exchanges an OAuth authorization code for an access token.
    async fn exchange_code(
        &self,
        principal: &PrincipalId,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<AccessGrant, ApiError>;

    /// GETs an admin API endpoint and returns the JSON body.
    async fn get_json(&self, principal: &PrincipalId, access_token: &str, endpoint: &str)
    -> Result<Value, ApiError>;

    /// Sends an arbitrary admin API request on behalf of the shop.
    async fn forward(
        &self,
        principal: &PrincipalId,
        access_token: &str,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError>;
}

/// Splits a comma-separated scope string into a set.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

/// Checks that `endpoint` is a relative admin API path.
///
/// # Errors
///
/// Returns [`MerchantError::InvalidRequest`] for empty values, absolute
/// URLs, leading slashes, backslashes, control characters and `..`
/// segments.
pub fn validate_endpoint(endpoint: &str) -> Result<&str, MerchantError> {
    let path = endpoint.split(['?', '#']).next().unwrap_or_default();

    if endpoint.trim().is_empty() {
        return Err(MerchantError::invalid_request("endpoint must not be empty"));
    }
    if endpoint.contains("://") || endpoint.starts_with('/') {
        return Err(MerchantError::invalid_request("endpoint must be a relative path"));
    }
    if endpoint.chars().any(|c| c == '\\' || c.is_control() || c.is_whitespace()) {
        return Err(MerchantError::invalid_request("endpoint contains forbidden characters"));
    }
    if path.split('/').any(|segment| segment == ".." || segment.eq_ignore_ascii_case("%2e%2e")) {
        return Err(MerchantError::invalid_request("endpoint must not contain '..'"));
    }
    Ok(endpoint)
}

/// Parses a `Retry-After` value given as (possibly fractional) seconds or
/// an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some(at.signed_duration_since(Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    scope: String,
}

/// reqwest-backed [`MerchantApi`].
#[derive(Debug, Clone)]
pub struct HttpMerchantClient {
    client: reqwest::Client,
    config: ClientConfig,
    base_url: Option<Url>,
}

impl HttpMerchantClient {
    /// Creates a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ConfigError::Invalid { field: "base_url", reason: e.to_string() })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "client",
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config, base_url })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::default())
    }

    fn origin(&self, principal: &PrincipalId) -> String {
        match &self.base_url {
            Some(base) => base.as_str().trim_end_matches('/').to_owned(),
            None => format!("https://{principal}"),
        }
    }

    fn url(&self, origin_relative: &str, principal: &PrincipalId) -> Result<Url, ApiError> {
        let raw = format!("{}/{origin_relative}", self.origin(principal));
        Url::parse(&raw).map_err(|e| ApiError::transport(format!("invalid request URL {raw}: {e}")))
    }

    fn admin_url(&self, principal: &PrincipalId, endpoint: &str) -> Result<Url, ApiError> {
        self.url(&format!("admin/api/{}/{endpoint}", self.config.api_version), principal)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Transport {
                    message: format!("request timed out after {:?}", self.config.timeout),
                    source: Some(e),
                }
            } else {
                ApiError::from(e)
            }
        })?;
        classify(response).await
    }
}

/// Maps a response onto the [`ApiError`] taxonomy; success passes through.
async fn classify(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        return Err(ApiError::throttled(retry_after));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::unauthorized(status.as_u16()));
    }

    let body = match response.text().await {
        Ok(text) if text.len() > MAX_ERROR_BODY => {
            let mut end = MAX_ERROR_BODY;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &text[..end])
        },
        Ok(text) => text,
        Err(e) => format!("[failed to read response body: {e}]"),
    };
    Err(ApiError::status(status.as_u16(), body))
}

async fn read_json(response: Response) -> Result<Value, ApiError> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(e.to_string()))
}

#[async_trait]
impl MerchantApi for HttpMerchantClient {
    #[tracing::instrument(skip(self, client_secret, code), fields(principal_id = %principal))]
    async fn exchange_code(
        &self,
        principal: &PrincipalId,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<AccessGrant, ApiError> {
        let url = self.url("admin/oauth/access_token", principal)?;
        let request = self.client.post(url).json(&serde_json::json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "code": code,
        }));

        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        let token: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(format!("token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(ApiError::decode("token response has an empty access_token"));
        }

        tracing::debug!(scope = %token.scope, "authorization code exchanged");
        Ok(AccessGrant { access_token: Zeroizing::new(token.access_token), scopes: parse_scopes(&token.scope) })
    }

    #[tracing::instrument(skip(self, access_token), fields(principal_id = %principal))]
    async fn get_json(
        &self,
        principal: &PrincipalId,
        access_token: &str,
        endpoint: &str,
    ) -> Result<Value, ApiError> {
        let url = self.admin_url(principal, endpoint)?;
        let response = self.send(self.client.get(url).header(ACCESS_TOKEN_HEADER, access_token)).await?;
        read_json(response).await
    }

    #[tracing::instrument(skip(self, access_token, body), fields(principal_id = %principal, method = %method))]
    async fn forward(
        &self,
        principal: &PrincipalId,
        access_token: &str,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.admin_url(principal, endpoint)?;
        let mut request = self.client.request(method, url).header(ACCESS_TOKEN_HEADER, access_token);
        if let Some(body) = body {
            request = request.json(body);
        }
        read_json(self.send(request).await?).await
    }
}
