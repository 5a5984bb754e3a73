//! In-memory storage backend implementation.
//!
//! [`MemoryBackend`] keeps keys in a [`BTreeMap`] behind
//! [`parking_lot::RwLock`]s. It backs the stats cache in single-process
//! deployments and every backend-level test.
//!
//! # TTL
//!
//! Expiry instants are computed from the backend's [`Clock`], so a test that
//! advances a [`ManualClock`](crate::ManualClock) sees keys expire without
//! sleeping. Expired keys are invisible to reads immediately; a background
//! task (started when a Tokio runtime is available) reclaims their memory
//! once per second.
//!
//! # Example
//!
//! ```
//! use storelink_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
//!     let value = backend.get(b"greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; everything is lost when the process exits
//! - No replication or distributed features

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    backend::StorageBackend,
    clock::{Clock, system_clock},
    error::StorageResult,
    transaction::Transaction,
    types::KeyValue,
};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory storage backend.
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    ttl_data: Arc<RwLock<BTreeMap<Vec<u8>, DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("keys", &self.data.read().len())
            .field("ttl_keys", &self.ttl_data.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// Creates an empty backend on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates an empty backend whose TTLs are evaluated against `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            ttl_data: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let weak_data = Arc::downgrade(&backend.data);
            let weak_ttl = Arc::downgrade(&backend.ttl_data);
            let clock = Arc::clone(&backend.clock);
            handle.spawn(cleanup_expired_keys(weak_data, weak_ttl, clock, shutdown_rx));
        }

        backend
    }

    /// Stops the background cleanup task.
    ///
    /// Expired keys remain invisible to reads afterwards; only their memory
    /// is no longer reclaimed.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Number of live (unexpired) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let data = self.data.read();
        data.keys().filter(|key| !self.is_expired(key)).count()
    }

    /// Returns `true` when no live keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, key: &[u8]) -> bool {
        let ttl_guard = self.ttl_data.read();
        ttl_guard.get(key).is_some_and(|expiry| *expiry <= self.clock.now())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn cleanup_expired_keys(
    data: std::sync::Weak<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    ttl_data: std::sync::Weak<RwLock<BTreeMap<Vec<u8>, DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(CLEANUP_INTERVAL) => {}
            _ = shutdown_rx.changed() => return,
        }

        let (Some(data), Some(ttl_data)) = (data.upgrade(), ttl_data.upgrade()) else {
            return;
        };

        let now = clock.now();
        let expired_keys: Vec<Vec<u8>> = ttl_data
            .read()
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(key, _)| key.clone())
            .collect();

        if !expired_keys.is_empty() {
            let mut data_guard = data.write();
            let mut ttl_guard = ttl_data.write();
            for key in expired_keys {
                data_guard.remove(&key);
                ttl_guard.remove(&key);
            }
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if self.is_expired(key) {
            return Ok(None);
        }

        let data = self.data.read();
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        // Lock order is always data -> ttl_data.
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        ttl_guard.remove(&key);
        data.insert(key, Bytes::from(value));
        Ok(())
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        data.insert(key.clone(), Bytes::from(value));
        ttl_guard.insert(key, expiry);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        data.remove(key);
        ttl_guard.remove(key);
        Ok(())
    }

    async fn get_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KeyValue>> {
        let data = self.data.read();

        let results = data
            .range::<[u8], _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| !self.is_expired(key))
            .map(|(key, value)| KeyValue::new(Bytes::copy_from_slice(key), value.clone()))
            .collect();

        Ok(results)
    }

    async fn clear_prefix(&self, prefix: &[u8]) -> StorageResult<()> {
        // Collect under a read lock so concurrent readers are not blocked
        // during the scan.
        let keys_to_remove: Vec<Vec<u8>> = {
            let data = self.data.read();
            data.range::<[u8], _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, _)| key.clone())
                .collect()
        };

        if keys_to_remove.is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        for key in &keys_to_remove {
            data.remove(key);
            ttl_guard.remove(key);
        }

        Ok(())
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }

    async fn health_check(&self) -> StorageResult<()> {
        // Acquiring the read lock proves the backend is not wedged.
        let _unused = self.data.read();
        Ok(())
    }
}

struct MemoryTransaction {
    backend: MemoryBackend,
    pending_writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl MemoryTransaction {
    fn new(backend: MemoryBackend) -> Self {
        Self { backend, pending_writes: BTreeMap::new() }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if let Some(value) = self.pending_writes.get(key) {
            return Ok(value.as_ref().map(|v| Bytes::copy_from_slice(v)));
        }

        self.backend.get(key).await
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending_writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.pending_writes.insert(key, None);
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut data = self.backend.data.write();
        let mut ttl_guard = self.backend.ttl_data.write();

        for (key, value) in self.pending_writes {
            ttl_guard.remove(&key);
            match value {
                Some(v) => {
                    data.insert(key, Bytes::from(v));
                },
                None => {
                    data.remove(&key);
                },
            }
        }

        Ok(())
    }
}
