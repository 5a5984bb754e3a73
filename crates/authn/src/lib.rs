//! # Storelink Authentication
//!
//! Tenant identity and request authentication for the storelink services.
//!
//! This crate provides:
//! - **Tenant registry**: registered apps loaded from the secret store into a
//!   soft-cached snapshot indexed by public id and tenant id
//! - **Session tokens**: two-phase HS256 verification (peek the audience,
//!   resolve the tenant, then verify with that tenant's secret)
//! - **Handshake signatures**: OAuth callback, app proxy and webhook HMACs
//!   plus the install correlation token
//!
//! ## Security
//!
//! - Only HS256 is accepted; `none` and every asymmetric algorithm are rejected
//!   before any signature is computed
//! - Signatures are compared in constant time
//! - Tenant secrets are held in zeroizing buffers and redacted from `Debug`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use storelink_authn::{AppRegistry, TokenVerifier};
//! use storelink_storage::{BackendSecretStore, MemoryBackend, SecretCipher, SecretNamespace, system_clock};
//!
//! # async fn example(cipher: SecretCipher) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(BackendSecretStore::new(MemoryBackend::new(), cipher));
//! let registry = Arc::new(AppRegistry::new(store, SecretNamespace::new("storelink")?, system_clock()));
//! let verifier = TokenVerifier::new(registry, system_clock());
//!
//! let context = verifier.verify(Some("Bearer eyJ..."), None).await?;
//! println!("tenant {} shop {}", context.tenant_id, context.principal_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Authentication error types.
pub mod error;
/// Install handshake signatures.
pub mod handshake;
/// Session token decoding and verification.
pub mod jwt;
/// Tenant app registry.
pub mod registry;
/// Registered tenant apps.
pub mod tenant;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
/// Algorithm validation.
pub mod validation;
/// Bearer token verifier.
pub mod verifier;

pub use error::{AuthError, Result};
pub use handshake::{
    CorrelationToken, SignatureStyle, compute_signature, compute_webhook_signature, verify_callback,
    verify_webhook,
};
pub use jwt::SessionClaims;
pub use registry::{AppRegistry, DEFAULT_FRESHNESS, RegistryConfig, TenantResolver};
pub use tenant::{AppStatus, TenantApp};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::{TenantContext, TokenVerifier, principal_from_destination};
