//! Hierarchical secret store.
//!
//! [`SecretStore`] is the namespace that owns tenant app registrations and
//! per-shop credentials. Values are either plain text or encrypted; encrypted
//! values are decrypted transparently on read and the returned [`Secret`]
//! remembers which kind it was.
//!
//! [`BackendSecretStore`] implements the contract over any
//! [`StorageBackend`]. Each value is persisted as a small JSON envelope:
//!
//! ```json
//! {"kind":"plain","value":"active"}
//! {"kind":"encrypted","value":"<base64 ciphertext>","nonce":"<base64 nonce>"}
//! ```

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    backend::StorageBackend,
    cipher::SecretCipher,
    error::{StorageError, StorageResult},
    path::SecretPath,
};

/// A value to be written to the secret store.
#[derive(Clone)]
pub enum SecretValue {
    /// Stored as-is.
    Plain(String),
    /// Stored encrypted at rest.
    Encrypted(Zeroizing<String>),
}

impl SecretValue {
    /// Convenience constructor for plain values.
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain(value.into())
    }

    /// Convenience constructor for encrypted values.
    pub fn encrypted(value: impl Into<String>) -> Self {
        Self::Encrypted(Zeroizing::new(value.into()))
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Encrypted(_) => f.debug_tuple("Encrypted").field(&"[REDACTED]").finish(),
        }
    }
}

/// A value read back from the secret store.
#[derive(Clone)]
pub struct Secret {
    value: Zeroizing<String>,
    encrypted: bool,
}

impl Secret {
    /// The (decrypted) value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Consumes the secret, returning the zeroizing value.
    #[must_use]
    pub fn into_inner(self) -> Zeroizing<String> {
        self.value
    }

    /// Whether the value was stored encrypted.
    #[must_use]
    pub fn was_encrypted(&self) -> bool {
        self.encrypted
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Secret");
        if self.encrypted {
            dbg.field("value", &"[REDACTED]");
        } else {
            dbg.field("value", &self.value.as_str());
        }
        dbg.field("encrypted", &self.encrypted).finish()
    }
}

/// Hierarchical secret storage contract.
///
/// Every delete is idempotent: removing a missing path succeeds.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Writes one value, overwriting any existing value at `path`.
    async fn put(&self, path: &SecretPath, value: SecretValue) -> StorageResult<()>;

    /// Writes several values in a single transaction: either all land or none do.
    async fn put_all(&self, entries: Vec<(SecretPath, SecretValue)>) -> StorageResult<()>;

    /// Reads one value. Missing paths are `Ok(None)`.
    async fn get(&self, path: &SecretPath) -> StorageResult<Option<Secret>>;

    /// Lists every value strictly below `prefix`, ordered by path.
    async fn list(&self, prefix: &SecretPath) -> StorageResult<Vec<(SecretPath, Secret)>>;

    /// Removes one value.
    async fn delete(&self, path: &SecretPath) -> StorageResult<()>;

    /// Removes several values in a single transaction.
    async fn delete_all(&self, paths: &[SecretPath]) -> StorageResult<()>;

    /// Removes every value strictly below `prefix`.
    async fn delete_prefix(&self, prefix: &SecretPath) -> StorageResult<()>;

    /// Verifies the underlying storage is reachable.
    async fn health_check(&self) -> StorageResult<()>;
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Envelope {
    Plain { value: String },
    Encrypted { value: String, nonce: String },
}

/// [`SecretStore`] over a byte-level [`StorageBackend`].
pub struct BackendSecretStore<B> {
    backend: B,
    cipher: Option<Arc<SecretCipher>>,
}

impl<B> fmt::Debug for BackendSecretStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSecretStore")
            .field("encryption", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> BackendSecretStore<B> {
    /// Creates a store that can hold encrypted values.
    #[must_use]
    pub fn new(backend: B, cipher: SecretCipher) -> Self {
        Self { backend, cipher: Some(Arc::new(cipher)) }
    }

    /// Creates a store without an encryption key.
    ///
    /// Writes of [`SecretValue::Encrypted`] are rejected, and reads of
    /// previously encrypted values fail.
    #[must_use]
    pub fn without_encryption(backend: B) -> Self {
        Self { backend, cipher: None }
    }

    /// Access to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn cipher(&self) -> StorageResult<&SecretCipher> {
        self.cipher
            .as_deref()
            .ok_or_else(|| StorageError::crypto("no encryption key configured"))
    }

    fn encode(&self, path: &SecretPath, value: SecretValue) -> StorageResult<Vec<u8>> {
        let envelope = match value {
            SecretValue::Plain(value) => Envelope::Plain { value },
            SecretValue::Encrypted(value) => {
                let sealed = self.cipher()?.seal(value.as_bytes(), path.as_str().as_bytes())?;
                Envelope::Encrypted {
                    value: STANDARD.encode(sealed.ciphertext),
                    nonce: STANDARD.encode(sealed.nonce),
                }
            },
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| StorageError::serialization_with_source("failed to encode secret envelope", e))
    }

    fn decode(&self, path: &SecretPath, raw: &[u8]) -> StorageResult<Secret> {
        let envelope: Envelope = serde_json::from_slice(raw).map_err(|e| {
            StorageError::serialization_with_source(format!("malformed secret at {path}"), e)
        })?;

        match envelope {
            Envelope::Plain { value } => Ok(Secret { value: Zeroizing::new(value), encrypted: false }),
            Envelope::Encrypted { value, nonce } => {
                let ciphertext = STANDARD
                    .decode(value)
                    .map_err(|_| StorageError::crypto(format!("ciphertext at {path} is not base64")))?;
                let nonce = STANDARD
                    .decode(nonce)
                    .map_err(|_| StorageError::crypto(format!("nonce at {path} is not base64")))?;
                let plaintext = self.cipher()?.open(&nonce, &ciphertext, path.as_str().as_bytes())?;
                let value = String::from_utf8(plaintext.to_vec())
                    .map_err(|_| StorageError::crypto(format!("secret at {path} is not UTF-8")))?;
                Ok(Secret { value: Zeroizing::new(value), encrypted: true })
            },
        }
    }
}

#[async_trait]
impl<B: StorageBackend> SecretStore for BackendSecretStore<B> {
    async fn put(&self, path: &SecretPath, value: SecretValue) -> StorageResult<()> {
        let bytes = self.encode(path, value)?;
        self.backend.set(path.to_key(), bytes).await
    }

    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    async fn put_all(&self, entries: Vec<(SecretPath, SecretValue)>) -> StorageResult<()> {
        // Encode everything first so an encryption failure leaves storage untouched.
        let mut encoded = Vec::with_capacity(entries.len());
        for (path, value) in entries {
            let bytes = self.encode(&path, value)?;
            encoded.push((path.to_key(), bytes));
        }

        let mut txn = self.backend.transaction().await?;
        for (key, bytes) in encoded {
            txn.set(key, bytes);
        }
        txn.commit().await
    }

    async fn get(&self, path: &SecretPath) -> StorageResult<Option<Secret>> {
        match self.backend.get(&path.to_key()).await? {
            Some(raw) => self.decode(path, &raw).map(Some),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(prefix = %prefix))]
    async fn list(&self, prefix: &SecretPath) -> StorageResult<Vec<(SecretPath, Secret)>> {
        let entries = self.backend.get_prefix(&prefix.descendant_prefix()).await?;
        tracing::trace!(count = entries.len(), "listed secrets");

        let mut out = Vec::with_capacity(entries.len());
        for kv in entries {
            let raw_path = std::str::from_utf8(&kv.key)
                .map_err(|_| StorageError::invalid_path("stored key is not UTF-8"))?;
            let path = SecretPath::parse(raw_path)?;
            let secret = self.decode(&path, &kv.value)?;
            out.push((path, secret));
        }
        Ok(out)
    }

    async fn delete(&self, path: &SecretPath) -> StorageResult<()> {
        self.backend.delete(&path.to_key()).await
    }

    #[tracing::instrument(skip_all, fields(paths = paths.len()))]
    async fn delete_all(&self, paths: &[SecretPath]) -> StorageResult<()> {
        let mut txn = self.backend.transaction().await?;
        for path in paths {
            txn.delete(path.to_key());
        }
        txn.commit().await
    }

    #[tracing::instrument(skip(self), fields(prefix = %prefix))]
    async fn delete_prefix(&self, prefix: &SecretPath) -> StorageResult<()> {
        self.backend.clear_prefix(&prefix.descendant_prefix()).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.backend.health_check().await.inspect_err(|e| {
            tracing::warn!(error = %e, "secret store backend unhealthy");
        })
    }
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    async fn put(&self, path: &SecretPath, value: SecretValue) -> StorageResult<()> {
        (**self).put(path, value).await
    }

    async fn put_all(&self, entries: Vec<(SecretPath, SecretValue)>) -> StorageResult<()> {
        (**self).put_all(entries).await
    }

    async fn get(&self, path: &SecretPath) -> StorageResult<Option<Secret>> {
        (**self).get(path).await
    }

    async fn list(&self, prefix: &SecretPath) -> StorageResult<Vec<(SecretPath, Secret)>> {
        (**self).list(prefix).await
    }

    async fn delete(&self, path: &SecretPath) -> StorageResult<()> {
        (**self).delete(path).await
    }

    async fn delete_all(&self, paths: &[SecretPath]) -> StorageResult<()> {
        (**self).delete_all(paths).await
    }

    async fn delete_prefix(&self, prefix: &SecretPath) -> StorageResult<()> {
        (**self).delete_prefix(prefix).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        (**self).health_check().await
    }
}
