//! TTL boundary condition tests for `MemoryBackend`.
//!
//! Expiry is measured on an injected clock, so these tests move time
//! explicitly instead of sleeping.

#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use storelink_storage::{ManualClock, MemoryBackend, StorageBackend};

fn backend_at(secs: i64) -> (MemoryBackend, ManualClock) {
    let clock = ManualClock::at_unix(secs);
    (MemoryBackend::with_clock(Arc::new(clock.clone())), clock)
}

// ============================================================================
// Zero TTL
// ============================================================================

/// A zero TTL expires at the insertion instant, so the next read misses.
#[tokio::test]
async fn test_zero_ttl_is_immediately_expired() {
    let (backend, _clock) = backend_at(1_000);

    backend
        .set_with_ttl(b"zero-ttl".to_vec(), b"ephemeral".to_vec(), Duration::ZERO)
        .await
        .expect("set_with_ttl with zero duration should succeed");

    let result = backend.get(b"zero-ttl").await.expect("get should not error");
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_zero_ttl_excluded_from_prefix_scan() {
    let (backend, _clock) = backend_at(1_000);

    backend.set(b"stats:a".to_vec(), b"permanent".to_vec()).await.expect("set");
    backend
        .set_with_ttl(b"stats:b".to_vec(), b"ghost".to_vec(), Duration::ZERO)
        .await
        .expect("set_with_ttl");
    backend.set(b"stats:c".to_vec(), b"also-permanent".to_vec()).await.expect("set");

    let results = backend.get_prefix(b"stats:").await.expect("get_prefix");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value, Bytes::from("permanent"));
    assert_eq!(results[1].value, Bytes::from("also-permanent"));
}

// ============================================================================
// Expiration boundary
// ============================================================================

/// The key is live strictly before `now + ttl` and gone at exactly that instant.
#[tokio::test]
async fn test_expiry_boundary_is_exclusive() {
    let (backend, clock) = backend_at(1_000);

    backend
        .set_with_ttl(b"k".to_vec(), b"v".to_vec(), Duration::from_secs(300))
        .await
        .expect("set_with_ttl");

    clock.advance(Duration::from_millis(299_999));
    assert!(backend.get(b"k").await.expect("get").is_some());

    clock.advance(Duration::from_millis(1));
    assert!(backend.get(b"k").await.expect("get").is_none());
}

/// Durations too large for the clock saturate instead of wrapping into the past.
#[tokio::test]
async fn test_huge_ttl_does_not_wrap() {
    let (backend, clock) = backend_at(1_000);

    backend.set_with_ttl(b"k".to_vec(), b"v".to_vec(), Duration::MAX).await.expect("set_with_ttl");

    clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    assert!(backend.get(b"k").await.expect("get").is_some());
}

// ============================================================================
// TTL replacement
// ============================================================================

/// A second `set_with_ttl` replaces the first expiry.
#[tokio::test]
async fn test_set_with_ttl_replaces_expiry() {
    let (backend, clock) = backend_at(1_000);

    backend.set_with_ttl(b"k".to_vec(), b"v1".to_vec(), Duration::from_secs(10)).await.expect("set");
    clock.advance(Duration::from_secs(5));
    backend.set_with_ttl(b"k".to_vec(), b"v2".to_vec(), Duration::from_secs(10)).await.expect("set");

    clock.advance(Duration::from_secs(9));
    assert_eq!(backend.get(b"k").await.expect("get"), Some(Bytes::from("v2")));

    clock.advance(Duration::from_secs(1));
    assert_eq!(backend.get(b"k").await.expect("get"), None);
}

/// A transaction write turns a TTL'd key into a permanent one.
#[tokio::test]
async fn test_transaction_write_clears_ttl() {
    let (backend, clock) = backend_at(1_000);

    backend.set_with_ttl(b"k".to_vec(), b"v1".to_vec(), Duration::from_secs(1)).await.expect("set");

    let mut txn = backend.transaction().await.expect("txn");
    txn.set(b"k".to_vec(), b"v2".to_vec());
    txn.commit().await.expect("commit");

    clock.advance(Duration::from_secs(60));
    assert_eq!(backend.get(b"k").await.expect("get"), Some(Bytes::from("v2")));
}
