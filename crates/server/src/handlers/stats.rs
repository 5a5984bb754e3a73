//! Bearer-authenticated shop endpoints.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header::AUTHORIZATION},
};
use serde::{Deserialize, Deserializer, de};
use serde_json::{Value, json};
use storelink_authn::TenantContext;
use storelink_merchant::StatsReport;
use storelink_storage::PrincipalId;

use super::header;
use crate::{
    error::{ApiError, Result},
    state::AppState,
};

/// Query of `GET /stats` and `POST /disconnect`.
#[derive(Debug, Default, Deserialize)]
pub struct ShopQuery {
    /// Bypass the cache. Accepts `true`/`false` and `1`/`0`.
    #[serde(default, deserialize_with = "flag")]
    pub refresh: bool,
    /// Shop the caller expects the token to be for.
    pub shop: Option<String>,
}

fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(de::Error::invalid_value(de::Unexpected::Str(other), &"true, false, 1 or 0")),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap, shop: Option<&str>) -> Result<TenantContext> {
    let expected = shop
        .filter(|s| !s.is_empty())
        .map(|s| PrincipalId::parse(s.to_ascii_lowercase()).map_err(|e| ApiError::invalid("shop", e.to_string())))
        .transpose()?;
    Ok(state.verifier.verify(header(headers, AUTHORIZATION.as_str()), expected.as_ref()).await?)
}

/// `GET /stats?refresh=&shop=`: cached store statistics.
///
/// # Errors
///
/// 401 for a bad token, 409 when the shop is not connected, plus the
/// upstream mappings of [`ApiError`].
#[tracing::instrument(name = "get_stats", skip_all, fields(refresh = query.refresh))]
pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ShopQuery>,
) -> Result<Json<StatsReport>> {
    let ctx = authenticate(&state, &headers, query.shop.as_deref()).await?;
    let report = state.aggregator.get_stats(&ctx.tenant_id, &ctx.principal_id, query.refresh).await?;
    Ok(Json(report))
}

/// `POST /disconnect`: forgets the caller's credential and cached stats.
///
/// Succeeds when nothing was stored.
///
/// # Errors
///
/// 401 for a bad token, 503 when the credential cannot be deleted.
#[tracing::instrument(name = "disconnect", skip_all)]
pub async fn disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ShopQuery>,
) -> Result<Json<Value>> {
    let ctx = authenticate(&state, &headers, query.shop.as_deref()).await?;
    state.vault.delete(&ctx.tenant_id, &ctx.principal_id).await?;
    if let Err(e) = state.aggregator.invalidate(&ctx.tenant_id, &ctx.principal_id).await {
        tracing::warn!(error = %e, "stats entry could not be dropped on disconnect");
    }
    Ok(Json(json!({ "disconnected": true, "shop": ctx.principal_id.as_str() })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use axum::http::Uri;
    use rstest::rstest;

    use super::*;

    fn parse(uri: &'static str) -> std::result::Result<ShopQuery, String> {
        Query::<ShopQuery>::try_from_uri(&Uri::from_static(uri)).map(|Query(q)| q).map_err(|e| e.to_string())
    }

    #[rstest]
    #[case("/stats", false)]
    #[case("/stats?refresh=", false)]
    #[case("/stats?refresh=0", false)]
    #[case("/stats?refresh=false", false)]
    #[case("/stats?refresh=1", true)]
    #[case("/stats?refresh=true", true)]
    #[case("/stats?refresh=TRUE&shop=a.myshopify.com", true)]
    fn test_refresh_flag(#[case] uri: &'static str, #[case] expected: bool) {
        assert_eq!(parse(uri).unwrap().refresh, expected);
    }

    #[test]
    fn test_refresh_flag_rejects_garbage() {
        assert!(parse("/stats?refresh=maybe").is_err());
    }
}
