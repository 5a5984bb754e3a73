//! # Storelink Merchant
//!
//! Everything that touches a connected shop: the credential vault, the
//! merchant platform client and the cached statistics aggregator.
//!
//! ```text
//! StatsAggregator ──▶ StatsCache ──▶ StorageBackend (TTL)
//!        │
//!        ├──────────▶ CredentialVault ──▶ SecretStore
//!        │
//!        └──────────▶ MerchantApi (HttpMerchantClient)
//! ```
//!
//! ## Errors
//!
//! [`MerchantError`] keeps the conditions a frontend reacts to apart:
//! `NotConnected` and `CredentialExpired` mean "reinstall", `RateLimited`
//! means "try later", the rest are upstream or storage failures.
//!
//! ## Feature Flags
//!
//! - **`testutil`**: a scripted [`MerchantApi`] and a fixture wiring the
//!   vault, cache and aggregator over in-memory backends.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Stats aggregation.
pub mod aggregator;
/// Stats cache.
pub mod cache;
/// Merchant platform client.
pub mod client;
/// Configuration.
pub mod config;
/// Error types.
pub mod error;
/// Throttle retry.
pub mod retry;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Credential vault.
pub mod vault;

pub use aggregator::{StatsAggregator, StatsReport};
pub use cache::{CacheEntry, Counters, StatsCache, cache_key};
pub use client::{
    ACCESS_TOKEN_HEADER, AccessGrant, HttpMerchantClient, MerchantApi, parse_scopes, validate_endpoint,
};
pub use config::{ClientConfig, RetryPolicy, StatsConfig};
pub use error::{ApiError, ConfigError, MerchantError, Result};
pub use reqwest::Method;
pub use vault::{CredentialVault, PrincipalCredential};
