//! Storage error types and result alias.
//!
//! Every backend and the secret store map their internal failures onto
//! [`StorageError`], so callers higher up (the registry, the credential
//! vault, the stats cache) only ever reason about one error type.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - Key does not exist
//! - [`StorageError::Conflict`] - Transaction could not be applied
//! - [`StorageError::Connection`] - Backend unreachable
//! - [`StorageError::Serialization`] - Stored bytes could not be decoded
//! - [`StorageError::Crypto`] - Encryption or decryption failed
//! - [`StorageError::InvalidPath`] - A secret path component was rejected
//! - [`StorageError::Internal`] - Anything else
//! - [`StorageError::Timeout`] - Operation exceeded its time limit
//!
//! # Example
//!
//! ```
//! use storelink_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(key))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via `#[source]`, so structured logging
/// can print the full cause.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested key was not found.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A transaction could not be applied.
    #[error("Transaction conflict")]
    Conflict,

    /// Connection or network error talking to the backend.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Stored bytes could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Encryption or decryption of a secret value failed.
    ///
    /// The message never contains key or plaintext material.
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the failure.
        message: String,
    },

    /// A secret path or one of its components is malformed.
    #[error("Invalid path: {message}")]
    InvalidPath {
        /// Why the path was rejected.
        message: String,
    },

    /// Backend-specific internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto { message: message.into() }
    }

    /// Creates a new `InvalidPath` error.
    #[must_use]
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath { message: message.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` for failures that may succeed when retried
    /// (connection problems and timeouts).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("a/b").to_string(), "Key not found: a/b");
        assert_eq!(StorageError::conflict().to_string(), "Transaction conflict");
        assert_eq!(StorageError::timeout().to_string(), "Operation timeout");
        assert_eq!(
            StorageError::invalid_path("empty component").to_string(),
            "Invalid path: empty component"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::connection("refused").is_transient());
        assert!(StorageError::timeout().is_transient());
        assert!(!StorageError::conflict().is_transient());
        assert!(!StorageError::crypto("tag mismatch").is_transient());
        assert!(!StorageError::not_found("k").is_transient());
    }

    #[test]
    fn test_source_chain_preserved() {
        let inner = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = StorageError::serialization_with_source("bad envelope", inner);
        assert!(err.source().is_some());
    }
}
