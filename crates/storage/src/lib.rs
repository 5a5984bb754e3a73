//! Storage layer for storelink.
//!
//! This crate provides the byte-level [`StorageBackend`] abstraction and the
//! [`SecretStore`] built on top of it. The secret store is the system of
//! record for registered tenant apps and per-shop credentials; plain
//! backends also hold the TTL'd statistics cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │   AppRegistry (authn)   │   CredentialVault, StatsCache     │
//! ├─────────────────────────┴───────────────────────────────────┤
//! │             SecretStore / BackendSecretStore                │
//! │   (typed SecretPath, JSON envelope, ChaCha20-Poly1305)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   StorageBackend trait                      │
//! │  (get, set, set_with_ttl, get_prefix, transaction, ...)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      MemoryBackend                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use storelink_storage::{
//!     BackendSecretStore, MemoryBackend, SecretCipher, SecretNamespace, SecretStore,
//!     SecretValue, TenantId, AppField,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = BackendSecretStore::new(MemoryBackend::new(), SecretCipher::new(&[9u8; 32]));
//!     let ns = SecretNamespace::new("storelink")?;
//!     let tenant = TenantId::parse("t1")?;
//!
//!     let path = ns.app_field(&tenant, AppField::ClientSecret);
//!     store.put(&path, SecretValue::encrypted("s3cr3t")).await?;
//!
//!     let secret = store.get(&path).await?.expect("just written");
//!     assert_eq!(secret.expose(), "s3cr3t");
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a fault-injecting
//!   backend and a fixed-key cipher. Enable this in `[dev-dependencies]`.

#![deny(unsafe_code)]

pub mod backend;
pub mod cipher;
pub mod clock;
pub mod error;
pub mod memory;
pub mod path;
pub mod secret;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod transaction;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use cipher::SecretCipher;
pub use clock::{Clock, ManualClock, SystemClock, system_clock};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use path::{AppField, SecretNamespace, SecretPath, ShopField};
pub use secret::{BackendSecretStore, Secret, SecretStore, SecretValue};
pub use transaction::Transaction;
pub use types::{InvalidId, KeyValue, PrincipalId, TenantId};
pub use zeroize::Zeroizing;
