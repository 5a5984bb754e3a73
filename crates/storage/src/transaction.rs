//! Transaction trait for atomic storage operations.
//!
//! Transactions buffer sets and deletes until [`Transaction::commit`], at
//! which point every operation is applied together or none is. Reads inside a
//! transaction see its own pending writes.
//!
//! # Example
//!
//! ```
//! use storelink_storage::{MemoryBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//!
//! let mut txn = backend.transaction().await.unwrap();
//! txn.set(b"shops/t1/a.example.com/access-token".to_vec(), b"tok".to_vec());
//! txn.set(b"shops/t1/a.example.com/scopes".to_vec(), b"read_products".to_vec());
//! txn.commit().await.unwrap();
//!
//! let scopes = backend.get(b"shops/t1/a.example.com/scopes").await.unwrap().unwrap();
//! assert_eq!(&scopes[..], b"read_products");
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Transaction handle for atomic multi-operation commits.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Gets a value within the transaction.
    ///
    /// Pending writes are checked first; keys untouched by this transaction
    /// fall through to the underlying storage. A key deleted in this
    /// transaction reads as `None`.
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Buffers a set operation.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Buffers a delete operation.
    fn delete(&mut self, key: Vec<u8>);

    /// Commits all buffered operations atomically.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`](crate::StorageError) when the backend
    /// cannot apply the batch. Nothing is applied in that case.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
