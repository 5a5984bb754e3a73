//! Shared test utilities for merchant access.
//!
//! [`StubMerchantApi`] is an in-process [`MerchantApi`] with scripted
//! responses per endpoint and a call log, for tests that exercise the
//! vault, aggregator or HTTP handlers without a mock server. Enable with
//! the `testutil` feature.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{Value, json};
use storelink_storage::{
    BackendSecretStore, Clock, MemoryBackend, PrincipalId, SecretNamespace, SecretStore, Zeroizing,
    testutil::test_cipher,
};

use crate::{
    aggregator::StatsAggregator,
    cache::StatsCache,
    client::{AccessGrant, MerchantApi},
    config::{DEFAULT_COUNTERS, StatsConfig},
    error::ApiError,
    vault::CredentialVault,
};

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum StubResponse {
    /// 2xx with this JSON body.
    Json(Value),
    /// 429 with an optional `Retry-After`.
    Throttled(Option<Duration>),
    /// 401 or 403.
    Unauthorized(u16),
    /// Any other status.
    Status(u16),
}

impl StubResponse {
    /// `{"count": n}`.
    #[must_use]
    pub fn count(n: i64) -> Self {
        Self::Json(json!({ "count": n }))
    }

    fn into_result(self) -> Result<Value, ApiError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Throttled(retry_after) => Err(ApiError::throttled(retry_after)),
            Self::Unauthorized(status) => Err(ApiError::unauthorized(status)),
            Self::Status(status) => Err(ApiError::status(status, "stubbed failure")),
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCall {
    /// HTTP method.
    pub method: Method,
    /// Shop the call was made for.
    pub principal: String,
    /// Endpoint, or `oauth/access_token` for code exchange.
    pub endpoint: String,
    /// Access token (or client id for code exchange).
    pub credential: String,
}

#[derive(Default)]
struct StubState {
    queued: HashMap<String, VecDeque<StubResponse>>,
    sticky: HashMap<String, StubResponse>,
    exchange: Option<Result<(String, BTreeSet<String>), u16>>,
    calls: Vec<StubCall>,
}

/// Scripted [`MerchantApi`].
///
/// Per endpoint, queued responses are served first, then the sticky
/// response; an unscripted endpoint answers 404.
#[derive(Clone, Default)]
pub struct StubMerchantApi {
    state: Arc<Mutex<StubState>>,
}

impl std::fmt::Debug for StubMerchantApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubMerchantApi").field("calls", &self.state.lock().calls.len()).finish()
    }
}

impl StubMerchantApi {
    /// Creates a stub with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every default counter endpoint with `{"count": n}`, using
    /// 1, 2, 3, ... in counter order.
    #[must_use]
    pub fn with_default_counts() -> Self {
        let stub = Self::new();
        for (n, (_, endpoint)) in (1..).zip(DEFAULT_COUNTERS.iter()) {
            stub.always(endpoint, StubResponse::count(n));
        }
        stub
    }

    /// Sets the response served whenever nothing is queued.
    pub fn always(&self, endpoint: &str, response: StubResponse) -> &Self {
        self.state.lock().sticky.insert(endpoint.to_owned(), response);
        self
    }

    /// Queues a one-shot response.
    pub fn once(&self, endpoint: &str, response: StubResponse) -> &Self {
        self.state.lock().queued.entry(endpoint.to_owned()).or_default().push_back(response);
        self
    }

    /// Makes code exchange succeed with this token and scopes.
    pub fn grant(&self, access_token: &str, scopes: &[&str]) -> &Self {
        self.state.lock().exchange =
            Some(Ok((access_token.to_owned(), scopes.iter().map(|s| (*s).to_owned()).collect())));
        self
    }

    /// Makes code exchange fail with `status`.
    pub fn reject_exchange(&self, status: u16) -> &Self {
        self.state.lock().exchange = Some(Err(status));
        self
    }

    /// All calls so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StubCall> {
        self.state.lock().calls.clone()
    }

    /// Calls made to `endpoint`.
    #[must_use]
    pub fn call_count(&self, endpoint: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.endpoint == endpoint).count()
    }

    /// Calls made to any endpoint.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn reply(&self, call: StubCall) -> Result<Value, ApiError> {
        let mut state = self.state.lock();
        let endpoint = call.endpoint.clone();
        state.calls.push(call);

        if let Some(response) = state.queued.get_mut(&endpoint).and_then(VecDeque::pop_front) {
            return response.into_result();
        }
        state.sticky.get(&endpoint).cloned().unwrap_or(StubResponse::Status(404)).into_result()
    }
}

#[async_trait]
impl MerchantApi for StubMerchantApi {
    async fn exchange_code(
        &self,
        principal: &PrincipalId,
        client_id: &str,
        _client_secret: &str,
        _code: &str,
    ) -> Result<AccessGrant, ApiError> {
        let mut state = self.state.lock();
        state.calls.push(StubCall {
            method: Method::POST,
            principal: principal.to_string(),
            endpoint: "oauth/access_token".to_owned(),
            credential: client_id.to_owned(),
        });

        match state.exchange.clone() {
            Some(Ok((token, scopes))) => Ok(AccessGrant { access_token: Zeroizing::new(token), scopes }),
            Some(Err(status)) => Err(ApiError::status(status, "stubbed exchange failure")),
            None => Err(ApiError::status(400, "no exchange scripted")),
        }
    }

    async fn get_json(
        &self,
        principal: &PrincipalId,
        access_token: &str,
        endpoint: &str,
    ) -> Result<Value, ApiError> {
        self.reply(StubCall {
            method: Method::GET,
            principal: principal.to_string(),
            endpoint: endpoint.to_owned(),
            credential: access_token.to_owned(),
        })
    }

    async fn forward(
        &self,
        principal: &PrincipalId,
        access_token: &str,
        method: Method,
        endpoint: &str,
        _body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.reply(StubCall {
            method,
            principal: principal.to_string(),
            endpoint: endpoint.to_owned(),
            credential: access_token.to_owned(),
        })
    }
}

/// Vault, cache and aggregator wired over in-memory backends.
pub struct MerchantFixture {
    /// Secret store behind the vault.
    pub store: Arc<dyn SecretStore>,
    /// Backend behind the stats cache.
    pub cache_backend: MemoryBackend,
    /// Credential vault.
    pub vault: Arc<CredentialVault>,
    /// Stats cache.
    pub cache: Arc<StatsCache>,
    /// Aggregator under test.
    pub aggregator: Arc<StatsAggregator>,
}

/// Builds a [`MerchantFixture`] around `api`.
///
/// # Panics
///
/// Panics if the namespace root is invalid.
pub fn merchant_fixture(api: Arc<dyn MerchantApi>, clock: Arc<dyn Clock>, config: StatsConfig) -> MerchantFixture {
    let store: Arc<dyn SecretStore> = Arc::new(BackendSecretStore::new(MemoryBackend::new(), test_cipher()));
    let namespace = SecretNamespace::new("storelink").expect("valid namespace");
    let vault = Arc::new(CredentialVault::new(Arc::clone(&store), namespace, Arc::clone(&clock)));

    let cache_backend = MemoryBackend::with_clock(Arc::clone(&clock));
    let cache = Arc::new(StatsCache::new(Arc::new(cache_backend.clone()), Arc::clone(&clock), config.cache_ttl));
    let aggregator =
        Arc::new(StatsAggregator::new(Arc::clone(&vault), Arc::clone(&cache), api, clock, config));

    MerchantFixture { store, cache_backend, vault, cache, aggregator }
}
