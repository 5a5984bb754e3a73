//! HTTP request handlers.
//!
//! - `health` - liveness and storage readiness
//! - `install` - OAuth install handshake (`/auth`, `/callback`)
//! - `stats` - bearer-authenticated stats and disconnect
//! - `proxy` - signed app proxy forwarding
//! - `webhooks` - uninstall and compliance webhooks

pub mod health;
pub mod install;
pub mod proxy;
pub mod stats;
pub mod webhooks;

use std::sync::Arc;

use axum::http::HeaderMap;
use storelink_authn::TenantApp;
use storelink_storage::TenantId;

pub use health::{liveness_check, readiness_check};
pub use install::{begin_install, complete_install};
pub use proxy::forward_proxy;
pub use stats::{disconnect, get_stats};
pub use webhooks::receive_webhook;

use crate::{
    error::{ApiError, Result},
    state::AppState,
};

/// Name of the cookie carrying the handshake nonce.
pub const STATE_COOKIE: &str = "storelink_oauth_state";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find_map(|(k, v)| (k == name).then_some(v))
}

async fn resolve_app(state: &AppState, raw_tenant: &str) -> Result<Arc<TenantApp>> {
    let tenant = TenantId::parse(raw_tenant).map_err(|e| ApiError::invalid("app", e.to_string()))?;
    state.registry.resolve_by_tenant_id(&tenant).await?.ok_or(ApiError::UnknownApp)
}
