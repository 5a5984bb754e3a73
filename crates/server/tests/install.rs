//! Install handshake through the router.
#![allow(clippy::expect_used, clippy::panic)]

mod common;

use std::collections::BTreeMap;

use axum::{
    body::Body,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, COOKIE, LOCATION, SET_COOKIE},
    },
};
use common::{FRONTEND, Harness, SHOP, harness};
use storelink_authn::{CorrelationToken, SignatureStyle, TenantApp, compute_signature};
use url::{Url, form_urlencoded};

fn location(reply: &common::Reply) -> String {
    reply.headers[LOCATION].to_str().expect("ascii location").to_owned()
}

/// Callback query signed with `secret_of`'s secret.
fn signed_callback(state: &str, secret_of: &TenantApp) -> String {
    let mut params = BTreeMap::from([
        ("code", "auth-code".to_owned()),
        ("shop", SHOP.to_owned()),
        ("state", state.to_owned()),
        ("timestamp", "1700000000".to_owned()),
    ]);
    let hmac = compute_signature(
        params.iter().map(|(k, v)| (*k, v.as_str())),
        secret_of.secret.as_bytes(),
        SignatureStyle::OAuth,
    );
    params.insert("hmac", hmac);

    let query = form_urlencoded::Serializer::new(String::new()).extend_pairs(params.iter()).finish();
    format!("/callback?{query}")
}

async fn callback(h: &Harness, uri: &str, cookie: Option<&str>) -> common::Reply {
    let mut request = Request::get(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, format!("storelink_oauth_state={cookie}"));
    }
    h.send(request.body(Body::empty()).expect("request")).await
}

#[tokio::test]
async fn test_auth_redirects_to_consent_with_state() {
    let h = harness().await;

    let reply = h.get(&format!("/auth?shop={SHOP}&app=t1")).await;

    assert_eq!(reply.status, StatusCode::FOUND);
    let url = Url::parse(&location(&reply)).expect("absolute location");
    assert_eq!(url.host_str(), Some(SHOP));
    assert_eq!(url.path(), "/admin/oauth/authorize");

    let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "pub-1");
    assert_eq!(query["scope"], "read_products,write_products,read_orders");
    assert_eq!(query["redirect_uri"], "http://localhost:8080/callback");

    let token = CorrelationToken::decode(&query["state"]).expect("state decodes");
    assert_eq!(token.tenant_id.as_str(), "t1");

    let cookie = reply.headers[SET_COOKIE].to_str().expect("ascii cookie");
    assert!(cookie.starts_with(&format!("storelink_oauth_state={};", token.nonce)));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_auth_rejects_bad_input() {
    let h = harness().await;

    assert_eq!(h.get("/auth?app=t1").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.get("/auth?shop=evil.example.com&app=t1").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.get(&format!("/auth?shop={SHOP}")).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.get(&format!("/auth?shop={SHOP}&app=nobody")).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_installs_and_redirects() {
    let h = harness().await;
    h.stub.grant("shpat_new", &["read_products", "read_orders"]);
    let token = CorrelationToken::issue(h.app.tenant_id.clone());

    let reply = callback(&h, &signed_callback(&token.encode(), &h.app), Some(&token.nonce)).await;

    assert_eq!(reply.status, StatusCode::FOUND);
    assert_eq!(location(&reply), format!("{FRONTEND}?shop={SHOP}&app=t1&installed=true"));
    assert!(reply.headers[SET_COOKIE].to_str().expect("ascii").contains("Max-Age=0"));

    let credential =
        h.state.vault.fetch(&h.app.tenant_id, &Harness::shop()).await.expect("readable").expect("stored");
    assert_eq!(credential.access_token.as_str(), "shpat_new");
    assert!(credential.scopes.contains("read_orders"));

    let exchange = &h.stub.calls()[0];
    assert_eq!(exchange.endpoint, "oauth/access_token");
    assert_eq!(exchange.credential, "pub-1");

    let stats = h
        .send(
            Request::get("/stats")
                .header(AUTHORIZATION, h.bearer(&h.app, SHOP))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(stats.status, StatusCode::OK);
}

#[tokio::test]
async fn test_callback_without_cookie_is_accepted() {
    let h = harness().await;
    h.stub.grant("shpat_new", &["read_products"]);
    let token = CorrelationToken::issue(h.app.tenant_id.clone());

    let reply = callback(&h, &signed_callback(&token.encode(), &h.app), None).await;

    assert_eq!(reply.status, StatusCode::FOUND);
}

#[tokio::test]
async fn test_callback_signed_with_other_tenant_secret_is_forbidden() {
    let h = harness().await;
    h.stub.grant("shpat_new", &["read_products"]);
    let token = CorrelationToken::issue(h.app.tenant_id.clone());

    let reply = callback(&h, &signed_callback(&token.encode(), &h.other), Some(&token.nonce)).await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(h.stub.total_calls(), 0, "no exchange after a bad signature");
    assert!(h.state.vault.fetch(&h.app.tenant_id, &Harness::shop()).await.expect("readable").is_none());
}

#[tokio::test]
async fn test_callback_state_cookie_mismatch_is_forbidden() {
    let h = harness().await;
    let token = CorrelationToken::issue(h.app.tenant_id.clone());

    let reply = callback(&h, &signed_callback(&token.encode(), &h.app), Some("someone-elses-nonce")).await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_callback_missing_parameters_is_bad_request() {
    let h = harness().await;

    assert_eq!(callback(&h, &format!("/callback?shop={SHOP}&hmac=00"), None).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        callback(&h, &format!("/callback?shop={SHOP}&hmac=00&code=c&state=not-a-token!"), None).await.status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_callback_rejected_code_stores_nothing() {
    let h = harness().await;
    h.stub.reject_exchange(400);
    let token = CorrelationToken::issue(h.app.tenant_id.clone());

    let reply = callback(&h, &signed_callback(&token.encode(), &h.app), Some(&token.nonce)).await;

    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.body["error"], "install_failed");
    assert!(h.state.vault.fetch(&h.app.tenant_id, &Harness::shop()).await.expect("readable").is_none());
}
