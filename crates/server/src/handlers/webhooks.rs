//! Uninstall and compliance webhooks.
//!
//! Topics:
//! - `app/uninstalled`: delete the shop's credential and cached stats
//! - `shop/redact`: erase everything stored below the shop
//! - `customers/data_request`, `customers/redact`: acknowledged; no
//!   customer data is stored
//!
//! The shop is read from the signed payload; the unsigned shop header must
//! agree with it when both are present. Every branch is idempotent so
//! platform redeliveries are harmless.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};
use storelink_authn::verify_webhook;
use storelink_storage::PrincipalId;

use super::{header, resolve_app};
use crate::{
    error::{ApiError, Result},
    state::AppState,
};

/// HMAC header set by the platform.
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
/// Topic header.
pub const TOPIC_HEADER: &str = "x-shopify-topic";
/// Shop domain header.
pub const SHOP_HEADER: &str = "x-shopify-shop-domain";

/// Shop named by the signed payload. The header is not covered by the HMAC,
/// so it is only consulted when the payload carries no shop and must agree
/// with the payload otherwise.
fn shop_from(headers: &HeaderMap, payload: &Value) -> Result<PrincipalId> {
    let signed = payload.get("shop_domain").and_then(Value::as_str).filter(|s| !s.is_empty());
    let unsigned = header(headers, SHOP_HEADER).filter(|s| !s.is_empty());

    let raw = match (signed, unsigned) {
        (Some(body), Some(head)) if !body.eq_ignore_ascii_case(head) => {
            tracing::warn!(payload = body, header = head, "webhook shop header disagrees with payload");
            return Err(ApiError::invalid("shop domain", "header does not match payload"));
        },
        (Some(body), _) => body,
        (None, Some(head)) => head,
        (None, None) => return Err(ApiError::MissingParameter("shop domain")),
    };
    PrincipalId::parse(raw.to_ascii_lowercase()).map_err(|e| ApiError::invalid("shop domain", e.to_string()))
}

/// `POST /webhooks/{tenant}`.
///
/// # Errors
///
/// - 401 when the HMAC header is missing or wrong
/// - 400 for an unsupported topic, a malformed body or no shop domain
/// - 404 for an unknown app, 503 when storage fails
#[tracing::instrument(
    name = "receive_webhook",
    skip_all,
    fields(tenant = %tenant, topic = tracing::field::Empty, principal_id = tracing::field::Empty)
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let app = resolve_app(&state, &tenant).await?;

    let signature = header(&headers, HMAC_HEADER).ok_or(ApiError::InvalidWebhookSignature)?;
    if !verify_webhook(&body, signature, app.secret.as_bytes()) {
        tracing::warn!(tenant_id = %app.tenant_id, "webhook signature rejected");
        return Err(ApiError::InvalidWebhookSignature);
    }

    let topic = header(&headers, TOPIC_HEADER).unwrap_or_default().to_owned();
    tracing::Span::current().record("topic", topic.as_str());

    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::invalid("body", e.to_string()))?
    };

    let action = match topic.as_str() {
        "app/uninstalled" => {
            let shop = shop_from(&headers, &payload)?;
            tracing::Span::current().record("principal_id", shop.as_str());
            state.vault.delete(&app.tenant_id, &shop).await?;
            if let Err(e) = state.aggregator.invalidate(&app.tenant_id, &shop).await {
                tracing::warn!(error = %e, "stats entry could not be dropped on uninstall");
            }
            "credentials_deleted"
        },
        "shop/redact" => {
            let shop = shop_from(&headers, &payload)?;
            tracing::Span::current().record("principal_id", shop.as_str());
            state.vault.purge_principal(&app.tenant_id, &shop).await?;
            if let Err(e) = state.aggregator.invalidate(&app.tenant_id, &shop).await {
                tracing::warn!(error = %e, "stats entry could not be dropped on redaction");
            }
            "data_deleted"
        },
        "customers/data_request" | "customers/redact" => "none_required",
        other => return Err(ApiError::UnsupportedTopic(other.to_owned())),
    };

    tracing::info!(tenant_id = %app.tenant_id, action, "webhook processed");

    Ok(Json(json!({
        "topic": topic,
        "action_taken": action,
        "data_stored": [],
    })))
}
