//! Router harness shared by the integration tests.
#![allow(dead_code, clippy::expect_used, clippy::panic)]

use std::{collections::BTreeSet, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use storelink_authn::{
    TenantApp,
    testutil::{seeded_registry, session_claims, sign_claims, test_app},
};
use storelink_merchant::testutil::StubMerchantApi;
use storelink_server::{AppState, Config, create_router};
use storelink_storage::{ManualClock, MemoryBackend, PrincipalId, Zeroizing, testutil::FaultyBackend};
use tower::ServiceExt;

pub const NOW: i64 = 1_700_000_000;
pub const SHOP: &str = "demo.myshopify.com";
pub const FRONTEND: &str = "https://dash.example.com";

pub struct Harness {
    pub state: AppState,
    pub stub: StubMerchantApi,
    pub clock: ManualClock,
    pub backend: FaultyBackend,
    pub app: TenantApp,
    pub other: TenantApp,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn harness() -> Harness {
    let clock = ManualClock::at_unix(NOW);
    let app = test_app("t1", "pub-1");
    let other = test_app("t2", "pub-2");
    let seeded = seeded_registry(&[app.clone(), other.clone()], Arc::new(clock.clone())).await;

    let mut config = Config::default();
    config.install.frontend_url = FRONTEND.to_owned();
    config.namespace = seeded.namespace.root().as_str().to_owned();

    let stub = StubMerchantApi::with_default_counts();
    let state = AppState::from_parts(
        &config,
        seeded.registry,
        seeded.store,
        Arc::new(MemoryBackend::with_clock(Arc::new(clock.clone()))),
        Arc::new(stub.clone()),
        Arc::new(clock.clone()),
    )
    .expect("state builds");

    Harness { state, stub, clock, backend: seeded.backend, app, other }
}

impl Harness {
    pub fn router(&self) -> Router {
        create_router(self.state.clone(), std::time::Duration::from_secs(30))
    }

    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.expect("body readable").to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        Reply { status, headers, body }
    }

    pub async fn get(&self, uri: &str) -> Reply {
        self.send(Request::get(uri).body(Body::empty()).expect("request")).await
    }

    pub fn bearer(&self, app: &TenantApp, shop: &str) -> String {
        let token = sign_claims(&session_claims(&app.public_id, shop, NOW), app.secret.as_bytes());
        format!("Bearer {token}")
    }

    pub fn shop() -> PrincipalId {
        PrincipalId::parse(SHOP).expect("valid shop")
    }

    pub async fn connect(&self, app: &TenantApp, shop: &str) {
        let shop = PrincipalId::parse(shop).expect("valid shop");
        self.state
            .vault
            .store(&app.tenant_id, &shop, Zeroizing::new("shpat_1".into()), &BTreeSet::from(["read_products".to_owned()]))
            .await
            .expect("credential stored");
    }
}
