//! Configuration for the merchant client, throttle retry and stats cache.
//!
//! Every struct deserializes with defaults for missing fields (durations in
//! humantime form such as `"30s"`) and exposes a validating `bon` builder.
//! Deserialized values should be checked with `validate()` before use.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Admin API version used in request paths.
pub const DEFAULT_API_VERSION: &str = "2024-01";
/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Calls made for one counter before giving up on throttling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Wait used when a 429 carries no `Retry-After`.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(2);
/// Upper bound on any single throttle wait.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
/// Lifetime of a cached stats entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
/// Budget for the whole remote phase of one stats request.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(25);

/// Counters fetched by default, as `(name, endpoint)`.
pub const DEFAULT_COUNTERS: [(&str, &str); 5] = [
    ("products", "products/count.json"),
    ("orders", "orders/count.json?status=any"),
    ("customers", "customers/count.json"),
    ("custom_collections", "custom_collections/count.json"),
    ("smart_collections", "smart_collections/count.json"),
];

fn default_counters() -> BTreeMap<String, String> {
    DEFAULT_COUNTERS.iter().map(|(name, endpoint)| ((*name).to_owned(), (*endpoint).to_owned())).collect()
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Admin API version, e.g. `2024-01`.
    pub api_version: String,
    /// Replaces `https://{shop}` as the origin of every request. Tests point
    /// this at a mock server.
    pub base_url: Option<String>,
    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_owned(),
            base_url: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("storelink/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

#[bon::bon]
impl ClientConfig {
    /// Creates a client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the timeout is zero, the API version is
    /// empty or the base URL does not parse.
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_API_VERSION.to_owned())] api_version: String,
        #[builder(into)] base_url: Option<String>,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] timeout: Duration,
        #[builder(into, default = ClientConfig::default().user_agent)] user_agent: String,
    ) -> Result<Self, ConfigError> {
        let config = Self { api_version, base_url, timeout, user_agent };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants of a deserialized configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "api_version", reason: "must not be empty".into() });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::BelowMinimum { field: "timeout", min: "1ms".into(), value: "0s".into() });
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base)
                .map_err(|e| ConfigError::Invalid { field: "base_url", reason: e.to_string() })?;
        }
        Ok(())
    }
}

/// Throttle retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first.
    pub max_attempts: u32,
    /// Wait used when the response has no usable `Retry-After`.
    #[serde(with = "humantime_serde")]
    pub fallback_delay: Duration,
    /// Cap applied to every wait.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

#[bon::bon]
impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `max_attempts` is zero or
    /// `max_delay` is shorter than `fallback_delay`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_ATTEMPTS)] max_attempts: u32,
        #[builder(default = DEFAULT_FALLBACK_DELAY)] fallback_delay: Duration,
        #[builder(default = DEFAULT_MAX_DELAY)] max_delay: Duration,
    ) -> Result<Self, ConfigError> {
        let policy = Self { max_attempts, fallback_delay, max_delay };
        policy.validate()?;
        Ok(policy)
    }

    /// Checks invariants of a deserialized policy.
    ///
    /// # Errors
    ///
    /// See [`RetryPolicy::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::BelowMinimum { field: "max_attempts", min: "1".into(), value: "0".into() });
        }
        if self.max_delay < self.fallback_delay {
            return Err(ConfigError::BelowMinimum {
                field: "max_delay",
                min: format!("{:?}", self.fallback_delay),
                value: format!("{:?}", self.max_delay),
            });
        }
        Ok(())
    }

    /// Wait before the next call given the server's hint.
    #[must_use]
    pub fn delay_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.fallback_delay).min(self.max_delay)
    }
}

/// Stats aggregation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Lifetime of a cache entry.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Deadline for the remote phase of one request.
    #[serde(with = "humantime_serde")]
    pub request_deadline: Duration,
    /// Counter name to endpoint, relative to the admin API root.
    pub counters: BTreeMap<String, String>,
    /// Throttle retry policy applied per counter.
    pub retry: RetryPolicy,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            request_deadline: DEFAULT_REQUEST_DEADLINE,
            counters: default_counters(),
            retry: RetryPolicy::default(),
        }
    }
}

#[bon::bon]
impl StatsConfig {
    /// Creates a stats configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a duration is zero, no counters are
    /// configured or the retry policy is invalid.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_CACHE_TTL)] cache_ttl: Duration,
        #[builder(default = DEFAULT_REQUEST_DEADLINE)] request_deadline: Duration,
        #[builder(default = default_counters())] counters: BTreeMap<String, String>,
        #[builder(default)] retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let config = Self { cache_ttl, request_deadline, counters, retry };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants of a deserialized configuration.
    ///
    /// # Errors
    ///
    /// See [`StatsConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::BelowMinimum { field: "cache_ttl", min: "1s".into(), value: "0s".into() });
        }
        if self.request_deadline.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "request_deadline",
                min: "1ms".into(),
                value: "0s".into(),
            });
        }
        if self.counters.is_empty() {
            return Err(ConfigError::Invalid { field: "counters", reason: "at least one counter is required".into() });
        }
        self.retry.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ClientConfig::default().validate().unwrap();
        RetryPolicy::default().validate().unwrap();
        StatsConfig::default().validate().unwrap();
        assert_eq!(StatsConfig::default().counters.len(), 5);
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let err = RetryPolicy::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "max_attempts", .. }));
    }

    #[test]
    fn test_builder_rejects_inverted_delays() {
        let result = RetryPolicy::builder()
            .fallback_delay(Duration::from_secs(5))
            .max_delay(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_delay_for_caps_and_falls_back() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(None), DEFAULT_FALLBACK_DELAY);
        assert_eq!(policy.delay_for(Some(Duration::from_secs(1))), Duration::from_secs(1));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(3600))), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        assert!(ClientConfig::builder().base_url("not a url").build().is_err());
        assert!(ClientConfig::builder().base_url("http://127.0.0.1:9999").build().is_ok());
    }

    #[test]
    fn test_stats_rejects_empty_counters() {
        assert!(StatsConfig::builder().counters(BTreeMap::new()).build().is_err());
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: StatsConfig =
            serde_json::from_str(r#"{"cache_ttl":"2m","retry":{"max_attempts":5,"fallback_delay":"500ms"}}"#)
                .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(120));
        assert_eq!(config.request_deadline, DEFAULT_REQUEST_DEADLINE);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.fallback_delay, Duration::from_millis(500));
        assert_eq!(config.retry.max_delay, DEFAULT_MAX_DELAY);
    }
}
