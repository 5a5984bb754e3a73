//! # Storelink Server
//!
//! The HTTP surface over the storelink core: the OAuth install handshake,
//! bearer-authenticated stats, signed app proxy forwarding and the
//! uninstall and compliance webhooks.
//!
//! ```text
//! GET  /auth, /callback      install handshake
//! GET  /stats                StatsAggregator
//! POST /disconnect           CredentialVault::delete
//! POST /proxy/{tenant}       MerchantApi::forward
//! POST /webhooks/{tenant}    uninstall / redaction
//! GET  /health, /ready       liveness, readiness
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::{AppSeed, Config, InstallConfig};
pub use error::ApiError;
pub use server::{create_router, start_server};
pub use state::AppState;
