//! Shared test utilities for storage consumers.
//!
//! Feature-gated behind `testutil` so none of this leaks into production
//! builds. Enable it from `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! storelink-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! The main piece is [`FaultyBackend`], a [`MemoryBackend`] wrapper whose
//! reads, writes and commits can be made to fail on demand. It is how the
//! registry, vault and cache tests exercise their storage-error paths.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    StorageBackend,
    cipher::{KEY_LEN, SecretCipher},
    clock::Clock,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
    secret::BackendSecretStore,
    transaction::Transaction,
    types::KeyValue,
};

/// Fixed key used by [`test_cipher`].
pub const TEST_KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];

/// A cipher with a fixed, well-known key.
#[must_use]
pub fn test_cipher() -> SecretCipher {
    SecretCipher::new(&TEST_KEY)
}

/// An encrypting secret store over a fresh in-memory backend.
#[must_use]
pub fn memory_secret_store() -> BackendSecretStore<MemoryBackend> {
    BackendSecretStore::new(MemoryBackend::new(), test_cipher())
}

#[derive(Debug, Default)]
struct Faults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_commits: AtomicBool,
    reads: AtomicUsize,
}

/// [`MemoryBackend`] wrapper with switchable failures.
///
/// Clones share both the data and the fault switches.
#[derive(Debug, Clone)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    faults: Arc<Faults>,
}

impl FaultyBackend {
    /// Wraps a fresh backend on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(MemoryBackend::new())
    }

    /// Wraps a fresh backend on `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::wrap(MemoryBackend::with_clock(clock))
    }

    /// Wraps an existing backend.
    #[must_use]
    pub fn wrap(inner: MemoryBackend) -> Self {
        Self { inner, faults: Arc::default() }
    }

    /// The wrapped backend, bypassing fault injection.
    #[must_use]
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Makes `get` and `get_prefix` fail with a connection error.
    pub fn fail_reads(&self, on: bool) {
        self.faults.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Makes direct writes and deletes fail with a connection error.
    pub fn fail_writes(&self, on: bool) {
        self.faults.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Makes transaction commits fail with a conflict, applying nothing.
    pub fn fail_commits(&self, on: bool) {
        self.faults.fail_commits.store(on, Ordering::SeqCst);
    }

    /// Number of read calls (`get` and `get_prefix`) observed so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.faults.reads.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> StorageResult<()> {
        self.faults.reads.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected write failure"));
        }
        Ok(())
    }
}

impl Default for FaultyBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for FaultyBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.check_write()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.check_write()?;
        self.inner.delete(key).await
    }

    async fn get_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<KeyValue>> {
        self.check_read()?;
        self.inner.get_prefix(prefix).await
    }

    async fn clear_prefix(&self, prefix: &[u8]) -> StorageResult<()> {
        self.check_write()?;
        self.inner.clear_prefix(prefix).await
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        let inner = self.inner.transaction().await?;
        Ok(Box::new(FaultyTransaction { inner, faults: Arc::clone(&self.faults) }))
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.check_read()?;
        self.inner.health_check().await
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    faults: Arc<Faults>,
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.set(key, value);
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.inner.delete(key);
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        if self.faults.fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::conflict());
        }
        self.inner.commit().await
    }
}

/// Asserts that a [`StorageResult`] is `Ok` and returns the value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}
