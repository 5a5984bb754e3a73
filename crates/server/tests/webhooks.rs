//! Uninstall and compliance webhooks, plus health checks.
#![allow(clippy::expect_used, clippy::panic)]

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header::AUTHORIZATION},
};
use common::{Harness, SHOP, harness};
use serde_json::json;
use storelink_authn::{TenantApp, compute_webhook_signature};
use storelink_storage::{PrincipalId, SecretStore};

fn webhook(tenant: &str, topic: &str, body: &str, signer: Option<&TenantApp>) -> Request<Body> {
    webhook_for_shop(tenant, topic, body, signer, SHOP)
}

fn webhook_for_shop(tenant: &str, topic: &str, body: &str, signer: Option<&TenantApp>, shop: &str) -> Request<Body> {
    let mut request = Request::post(format!("/webhooks/{tenant}"))
        .header("x-shopify-topic", topic)
        .header("x-shopify-shop-domain", shop)
        .header("content-type", "application/json");
    if let Some(app) = signer {
        request = request.header("x-shopify-hmac-sha256", compute_webhook_signature(body.as_bytes(), app.secret.as_bytes()));
    }
    request.body(Body::from(body.to_owned())).expect("request")
}

fn payload() -> String {
    json!({ "shop_id": 1, "shop_domain": SHOP }).to_string()
}

#[tokio::test]
async fn test_uninstall_deletes_credential_and_cache_and_replays_cleanly() {
    let h = harness().await;
    h.connect(&h.app, SHOP).await;
    let bearer = h.bearer(&h.app, SHOP);
    let stats = Request::get("/stats").header(AUTHORIZATION, &bearer).body(Body::empty()).expect("request");
    assert_eq!(h.send(stats).await.status, StatusCode::OK);

    let body = payload();
    let reply = h.send(webhook("t1", "app/uninstalled", &body, Some(&h.app))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["action_taken"], "credentials_deleted");
    assert!(h.state.vault.fetch(&h.app.tenant_id, &Harness::shop()).await.expect("readable").is_none());

    let replay = h.send(webhook("t1", "app/uninstalled", &body, Some(&h.app))).await;
    assert_eq!(replay.status, StatusCode::OK);

    let stats = Request::get("/stats").header(AUTHORIZATION, &bearer).body(Body::empty()).expect("request");
    assert_eq!(h.send(stats).await.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_shop_redact_erases_everything_below_the_shop() {
    let h = harness().await;
    h.connect(&h.app, SHOP).await;
    h.connect(&h.other, SHOP).await;

    let reply = h.send(webhook("t1", "shop/redact", &payload(), Some(&h.app))).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["action_taken"], "data_deleted");
    let shop_root = h.state.vault.list_principals(&h.app.tenant_id).await.expect("readable");
    assert!(shop_root.is_empty());
    assert!(
        h.state.vault.fetch(&h.other.tenant_id, &Harness::shop()).await.expect("readable").is_some(),
        "other tenants keep their credential"
    );
}

#[tokio::test]
async fn test_customer_topics_are_acknowledged() {
    let h = harness().await;
    let body = json!({ "shop_domain": SHOP, "customer": { "id": 9 } }).to_string();

    for topic in ["customers/data_request", "customers/redact"] {
        let reply = h.send(webhook("t1", topic, &body, Some(&h.app))).await;
        assert_eq!(reply.status, StatusCode::OK, "{topic}");
        assert_eq!(reply.body["action_taken"], "none_required");
        assert_eq!(reply.body["data_stored"], json!([]));
    }
}

#[tokio::test]
async fn test_unknown_topic_is_bad_request() {
    let h = harness().await;

    let reply = h.send(webhook("t1", "orders/create", &payload(), Some(&h.app))).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["topic"], "orders/create");
}

#[tokio::test]
async fn test_bad_or_missing_hmac_is_unauthorized() {
    let h = harness().await;
    h.connect(&h.app, SHOP).await;

    let forged = h.send(webhook("t1", "app/uninstalled", &payload(), Some(&h.other))).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    let unsigned = h.send(webhook("t1", "app/uninstalled", &payload(), None)).await;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);

    assert!(h.state.vault.fetch(&h.app.tenant_id, &Harness::shop()).await.expect("readable").is_some());
}

#[tokio::test]
async fn test_shop_header_cannot_redirect_a_signed_body() {
    let h = harness().await;
    let victim = "victim.myshopify.com";
    h.connect(&h.app, victim).await;
    let victim_id = PrincipalId::parse(victim).expect("valid shop");

    for topic in ["app/uninstalled", "shop/redact"] {
        let reply = h.send(webhook_for_shop("t1", topic, &payload(), Some(&h.app), victim)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{topic}");
    }

    assert!(h.state.vault.fetch(&h.app.tenant_id, &victim_id).await.expect("readable").is_some());
}

#[tokio::test]
async fn test_payload_without_shop_falls_back_to_header() {
    let h = harness().await;
    h.connect(&h.app, SHOP).await;
    let body = json!({ "shop_id": 1 }).to_string();

    let reply = h.send(webhook("t1", "app/uninstalled", &body, Some(&h.app))).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(h.state.vault.fetch(&h.app.tenant_id, &Harness::shop()).await.expect("readable").is_none());
}

#[tokio::test]
async fn test_unknown_tenant_is_not_found() {
    let h = harness().await;

    let reply = h.send(webhook("nobody", "app/uninstalled", &payload(), Some(&h.app))).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_readiness_report_storage_state() {
    let h = harness().await;

    assert_eq!(h.get("/health").await.status, StatusCode::OK);
    assert_eq!(h.get("/ready").await.status, StatusCode::OK);
    assert!(h.state.store.health_check().await.is_ok());

    h.backend.fail_reads(true);
    assert_eq!(h.get("/health").await.status, StatusCode::OK);
    let ready = h.send(Request::builder().method(Method::GET).uri("/ready").body(Body::empty()).expect("request")).await;
    assert_eq!(ready.status, StatusCode::SERVICE_UNAVAILABLE);
}
