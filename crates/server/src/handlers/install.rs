//! OAuth install handshake.
//!
//! `/auth` sends the merchant to the platform's consent screen carrying a
//! correlation token as `state`; the nonce inside it is also set as a cookie.
//! `/callback` decodes the token, checks the nonce against the cookie when
//! the browser sent one, verifies the callback HMAC with the tenant's secret,
//! exchanges the code and stores the resulting credential.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::{
        HeaderMap, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use storelink_authn::{CorrelationToken, SignatureStyle, verify_callback};
use url::{Url, form_urlencoded};

use super::{STATE_COOKIE, cookie, resolve_app};
use crate::{
    error::{ApiError, Result},
    state::AppState,
};

/// Query of `GET /auth`.
#[derive(Debug, Deserialize)]
pub struct InstallQuery {
    /// Shop domain, e.g. `demo.myshopify.com`.
    pub shop: Option<String>,
    /// Tenant id of the app being installed.
    pub app: Option<String>,
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or(ApiError::MissingParameter(name))
}

fn state_cookie(value: &str, secure: bool, max_age: Option<u32>) -> String {
    let mut cookie = format!("{STATE_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    cookie
}

/// `GET /auth?shop=&app=`: redirects to the platform's authorize page.
///
/// # Errors
///
/// 400 on a missing or malformed shop or app, 404 for an unknown app.
#[tracing::instrument(name = "begin_install", skip_all, fields(shop = ?query.shop, app = ?query.app))]
pub async fn begin_install(State(state): State<AppState>, Query(query): Query<InstallQuery>) -> Result<Response> {
    let raw_shop = required(query.shop.as_deref(), "shop")?;
    let shop =
        state.install.parse_shop(raw_shop).ok_or_else(|| ApiError::invalid("shop", "not a valid shop domain"))?;
    let app = resolve_app(&state, required(query.app.as_deref(), "app")?).await?;

    let token = CorrelationToken::issue(app.tenant_id.clone());
    let mut authorize = Url::parse(&format!("https://{shop}/admin/oauth/authorize"))
        .map_err(|e| ApiError::invalid("shop", e.to_string()))?;
    authorize
        .query_pairs_mut()
        .append_pair("client_id", &app.public_id)
        .append_pair("scope", &state.install.scopes)
        .append_pair("redirect_uri", &state.install.redirect_uri())
        .append_pair("state", &token.encode());

    tracing::info!(tenant_id = %app.tenant_id, principal_id = %shop, "install started");

    Ok((
        StatusCode::FOUND,
        [
            (LOCATION, authorize.to_string()),
            (SET_COOKIE, state_cookie(&token.nonce, state.install.secure_cookies, None)),
        ],
    )
        .into_response())
}

/// `GET /callback`: completes the install and redirects to the frontend.
///
/// # Errors
///
/// - 400 when `code`, `hmac`, `shop` or `state` is missing or malformed
/// - 403 on a bad HMAC or a state cookie mismatch
/// - 404 when the state names an unknown app
/// - 502 when the platform refuses the code
/// - 503 when the credential cannot be stored
#[tracing::instrument(name = "complete_install", skip_all, fields(shop = ?params.get("shop")))]
pub async fn complete_install(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response> {
    let param = |name: &'static str| required(params.get(name).map(String::as_str), name);
    let code = param("code")?;
    let signature = param("hmac")?;
    let raw_shop = param("shop")?;
    let raw_state = param("state")?;

    let shop =
        state.install.parse_shop(raw_shop).ok_or_else(|| ApiError::invalid("shop", "not a valid shop domain"))?;
    let token = CorrelationToken::decode(raw_state).map_err(|e| ApiError::invalid("state", e.to_string()))?;

    if let Some(nonce) = cookie(&headers, STATE_COOKIE)
        && nonce != token.nonce
    {
        return Err(ApiError::StateMismatch);
    }

    let app = state.registry.resolve_by_tenant_id(&token.tenant_id).await?.ok_or(ApiError::UnknownApp)?;

    let pairs = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    if !verify_callback(pairs, signature, app.secret.as_bytes(), SignatureStyle::OAuth) {
        tracing::warn!(tenant_id = %app.tenant_id, principal_id = %shop, "callback signature rejected");
        return Err(ApiError::InvalidSignature);
    }

    let grant =
        state.api.exchange_code(&shop, &app.public_id, &app.secret, code).await.map_err(ApiError::ExchangeFailed)?;
    state.vault.store(&app.tenant_id, &shop, grant.access_token, &grant.scopes).await?;

    if let Err(e) = state.aggregator.invalidate(&app.tenant_id, &shop).await {
        tracing::warn!(error = %e, "stale stats entry could not be dropped");
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("shop", shop.as_str())
        .append_pair("app", app.tenant_id.as_str())
        .append_pair("installed", "true")
        .finish();
    let location = format!("{}?{query}", state.install.frontend_url);

    Ok((
        StatusCode::FOUND,
        [(LOCATION, location), (SET_COOKIE, state_cookie("", state.install.secure_cookies, Some(0)))],
    )
        .into_response())
}
