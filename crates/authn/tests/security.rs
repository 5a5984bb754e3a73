//! Security-focused authentication tests.
//!
//! These tests drive the full bearer pipeline (registry lookup, algorithm
//! check, signature, time claims, audience, destination, principal) and
//! check that each attack fails with its own error.
#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;
use storelink_authn::{
    TokenVerifier, assert_auth_error,
    error::AuthError,
    jwt::SessionClaims,
    testutil::{SeededRegistry, craft_raw_jwt, seeded_registry, session_claims, sign_claims, test_app},
};
use storelink_storage::{ManualClock, PrincipalId};

const NOW: i64 = 1_700_000_000;

struct Harness {
    seeded: SeededRegistry,
    clock: ManualClock,
    verifier: TokenVerifier,
}

async fn harness() -> Harness {
    let clock = ManualClock::at_unix(NOW);
    let seeded =
        seeded_registry(&[test_app("t1", "pub-1"), test_app("t2", "pub-2")], Arc::new(clock.clone())).await;
    let verifier = TokenVerifier::new(seeded.registry.clone(), Arc::new(clock.clone()));
    Harness { seeded, clock, verifier }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn signed_for(audience: &str, secret: &str) -> String {
    sign_claims(&session_claims(audience, "a.example.com", NOW), secret.as_bytes())
}

fn principal(shop: &str) -> PrincipalId {
    PrincipalId::parse(shop).expect("valid principal")
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_valid_token_yields_context() {
    let h = harness().await;
    let token = signed_for("pub-1", "t1-secret");

    let ctx = h
        .verifier
        .verify(Some(&bearer(&token)), Some(&principal("a.example.com")))
        .await
        .expect("token should verify");

    assert_eq!(ctx.tenant_id.as_str(), "t1");
    assert_eq!(ctx.principal_id.as_str(), "a.example.com");
    assert_eq!(ctx.public_id, "pub-1");
    assert_eq!(ctx.subject, "42");
    assert_eq!(ctx.session_id.as_deref(), Some("session-1"));
}

#[tokio::test]
async fn test_no_expected_principal_accepts_any_shop() {
    let h = harness().await;
    let token = sign_claims(&session_claims("pub-2", "b.example.com", NOW), b"t2-secret");

    let ctx = h.verifier.verify(Some(&bearer(&token)), None).await.expect("token should verify");
    assert_eq!(ctx.tenant_id.as_str(), "t2");
    assert_eq!(ctx.principal_id.as_str(), "b.example.com");
}

// ---------------------------------------------------------------------------
// Header handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_or_malformed_bearer() {
    let h = harness().await;
    let token = signed_for("pub-1", "t1-secret");

    assert_auth_error!(h.verifier.verify(None, None).await, MissingBearer);
    assert_auth_error!(h.verifier.verify(Some(""), None).await, MissingBearer);
    assert_auth_error!(h.verifier.verify(Some("Bearer "), None).await, MissingBearer);
    assert_auth_error!(h.verifier.verify(Some(&format!("Basic {token}")), None).await, MissingBearer);
    assert_auth_error!(h.verifier.verify(Some(&token), None).await, MissingBearer);
}

#[tokio::test]
async fn test_malformed_token_structure() {
    let h = harness().await;

    for raw in ["abc", "a.b", "a.b.c.d", "!!.??.x"] {
        assert_auth_error!(h.verifier.verify(Some(&bearer(raw)), None).await, InvalidTokenFormat, raw);
    }

    let not_json = format!("{}.{}.sig", URL_SAFE_NO_PAD.encode(b"{}"), URL_SAFE_NO_PAD.encode(b"not json"));
    assert_auth_error!(h.verifier.verify(Some(&bearer(&not_json)), None).await, InvalidTokenFormat);
}

// ---------------------------------------------------------------------------
// Tenant resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_audience_is_unknown_tenant() {
    let h = harness().await;
    let token = signed_for("pub-unknown", "whatever");
    assert_auth_error!(h.verifier.verify(Some(&bearer(&token)), None).await, UnknownTenant);
}

#[tokio::test]
async fn test_cross_tenant_secret_is_invalid_signature() {
    let h = harness().await;
    // Audience names tenant one but the token was signed with tenant two's secret.
    let token = signed_for("pub-1", "t2-secret");
    assert_auth_error!(h.verifier.verify(Some(&bearer(&token)), None).await, InvalidSignature);
}

#[tokio::test]
async fn test_registry_failure_is_distinct_from_unknown_tenant() {
    let h = harness().await;
    h.seeded.backend.fail_reads(true);

    let token = signed_for("pub-1", "t1-secret");
    let err = h.verifier.verify(Some(&bearer(&token)), None).await.expect_err("storage is down");
    assert!(matches!(err, AuthError::RegistryUnavailable(_)), "got {err:?}");
    assert!(err.is_storage());
}

// ---------------------------------------------------------------------------
// Algorithm substitution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_algorithm_none_rejected_end_to_end() {
    let h = harness().await;
    let payload = serde_json::to_value(session_claims("pub-1", "a.example.com", NOW)).expect("claims json");

    for signature in ["", "x"] {
        let token = craft_raw_jwt(&json!({"alg": "none", "typ": "JWT"}), &payload, signature);
        let result = h.verifier.verify(Some(&bearer(&token)), None).await;
        if signature.is_empty() {
            assert_auth_error!(result, InvalidTokenFormat);
        } else {
            assert_auth_error!(result, UnsupportedAlgorithm);
        }
    }
}

#[tokio::test]
async fn test_other_algorithms_rejected_before_signature() {
    let h = harness().await;
    let payload = serde_json::to_value(session_claims("pub-1", "a.example.com", NOW)).expect("claims json");

    for alg in ["HS384", "HS512", "RS256", "ES256", "EdDSA", "hs256"] {
        let token = craft_raw_jwt(&json!({"alg": alg}), &payload, "c2ln");
        assert_auth_error!(h.verifier.verify(Some(&bearer(&token)), None).await, UnsupportedAlgorithm, alg);
    }
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let h = harness().await;
    let token = signed_for("pub-1", "t1-secret");
    let [header, _, signature]: [&str; 3] =
        token.split('.').collect::<Vec<_>>().try_into().expect("three segments");

    let forged = session_claims("pub-1", "evil.example.com", NOW);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).expect("claims json"));
    let tampered = format!("{header}.{payload}.{signature}");

    assert_auth_error!(h.verifier.verify(Some(&bearer(&tampered)), None).await, InvalidSignature);
}

// ---------------------------------------------------------------------------
// Time claims
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_expired_token() {
    let h = harness().await;
    let token = signed_for("pub-1", "t1-secret");

    h.clock.advance(Duration::from_secs(60));
    assert_auth_error!(h.verifier.verify(Some(&bearer(&token)), None).await, TokenExpired);
}

#[tokio::test]
async fn test_token_valid_one_second_before_expiry() {
    let h = harness().await;
    let token = signed_for("pub-1", "t1-secret");

    h.clock.advance(Duration::from_secs(59));
    assert!(h.verifier.verify(Some(&bearer(&token)), None).await.is_ok());
}

#[tokio::test]
async fn test_future_nbf_rejected() {
    let h = harness().await;
    let claims = SessionClaims { nbf: Some(NOW + 30), ..session_claims("pub-1", "a.example.com", NOW) };
    let token = sign_claims(&claims, b"t1-secret");

    assert_auth_error!(h.verifier.verify(Some(&bearer(&token)), None).await, TokenNotYetValid);
}

#[tokio::test]
async fn test_leeway_tolerates_skew() {
    let h = harness().await;
    let verifier = TokenVerifier::new(h.seeded.registry.clone(), Arc::new(h.clock.clone()))
        .with_leeway(Duration::from_secs(10));
    let token = signed_for("pub-1", "t1-secret");

    h.clock.advance(Duration::from_secs(65));
    assert!(verifier.verify(Some(&bearer(&token)), None).await.is_ok());
}

// ---------------------------------------------------------------------------
// Destination and principal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_principal_mismatch_is_distinct() {
    let h = harness().await;
    let token = signed_for("pub-1", "t1-secret");

    let err = h
        .verifier
        .verify(Some(&bearer(&token)), Some(&principal("b.example.com")))
        .await
        .expect_err("principal differs");

    match err {
        AuthError::PrincipalMismatch { expected, actual } => {
            assert_eq!(expected, "b.example.com");
            assert_eq!(actual, "a.example.com");
        },
        other => panic!("expected PrincipalMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_destination_without_host_rejected() {
    let h = harness().await;
    let claims = SessionClaims { dest: "not a url".into(), ..session_claims("pub-1", "a.example.com", NOW) };
    let token = sign_claims(&claims, b"t1-secret");

    assert_auth_error!(h.verifier.verify(Some(&bearer(&token)), None).await, InvalidDestination);
}
