//! Storage backend trait definition.
//!
//! [`StorageBackend`] is the byte-level key-value abstraction that every
//! higher layer sits on: the [`SecretStore`](crate::SecretStore) persists
//! tenant apps and shop credentials through it, and the stats cache keeps
//! its TTL'd entries in one.
//!
//! # Design
//!
//! - **Keys and values are bytes**: no assumptions about serialization format
//! - **Async by default**: all operations are async for non-blocking I/O
//! - **Prefix scans**: the secret layout is hierarchical, so listing and purging happen by prefix
//! - **Transactional**: multi-key writes go through [`Transaction`]
//!
//! The trait is object safe; callers that need to swap backends at runtime
//! hold an `Arc<dyn StorageBackend>`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, transaction::Transaction, types::KeyValue};

/// Abstract storage backend for key-value operations.
///
/// Backends must be thread-safe (`Send + Sync`) and support concurrent
/// operations.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`set`](StorageBackend::set) | Store a key-value pair |
/// | [`set_with_ttl`](StorageBackend::set_with_ttl) | Store with automatic expiration |
/// | [`delete`](StorageBackend::delete) | Remove a key |
/// | [`get_prefix`](StorageBackend::get_prefix) | Retrieve every key below a prefix |
/// | [`clear_prefix`](StorageBackend::clear_prefix) | Delete every key below a prefix |
/// | [`transaction`](StorageBackend::transaction) | Begin an atomic transaction |
/// | [`health_check`](StorageBackend::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use storelink_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
/// let value = backend.get(b"key").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("value")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` when the key does not exist or its TTL has passed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value and clearing
    /// any TTL previously set on the key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Stores a key-value pair that expires after `ttl`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Removes a key. Deleting a missing key is not an error.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Returns every live key-value pair whose key starts with `prefix`,
    /// ordered by key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KeyValue>>;

    /// Deletes every key that starts with `prefix`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn clear_prefix(&self, prefix: &[u8]) -> StorageResult<()>;

    /// Begins a transaction whose buffered writes apply atomically on commit.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Verifies the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        (**self).delete(key).await
    }

    async fn get_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KeyValue>> {
        (**self).get_prefix(prefix).await
    }

    async fn clear_prefix(&self, prefix: &[u8]) -> StorageResult<()> {
        (**self).clear_prefix(prefix).await
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        (**self).transaction().await
    }

    async fn health_check(&self) -> StorageResult<()> {
        (**self).health_check().await
    }
}
