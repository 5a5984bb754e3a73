//! Service configuration.
//!
//! Loaded in priority order:
//! 1. Environment variables prefixed `STORELINK_` (nested keys use `__`,
//!    e.g. `STORELINK_STATS__CACHE_TTL=10m`)
//! 2. `storelink.toml` in the working directory
//! 3. Built-in defaults
//!
//! The service starts with defaults alone except for the encryption key,
//! which must be supplied as base64 of 32 bytes in
//! `STORELINK_ENCRYPTION_KEY`.

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use storelink_authn::{AppStatus, RegistryConfig, TenantApp};
use storelink_merchant::{ClientConfig, StatsConfig};
use storelink_storage::{PrincipalId, TenantId, Zeroizing};
use url::Url;

const CONFIG_FILE: &str = "storelink.toml";
const ENV_PREFIX: &str = "STORELINK_";

/// Complete service configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Per-request timeout enforced by the router.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Root of every secret path.
    pub namespace: String,
    /// Base64 of the 32-byte secret encryption key.
    pub encryption_key: Option<String>,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Clock skew tolerated on session token `exp` and `nbf`.
    #[serde(with = "humantime_serde")]
    pub token_leeway: Duration,
    /// Install handshake settings.
    pub install: InstallConfig,
    /// Tenant registry tuning.
    pub registry: RegistryConfig,
    /// Merchant platform client.
    pub client: ClientConfig,
    /// Stats aggregation.
    pub stats: StatsConfig,
    /// Apps registered at startup.
    pub apps: Vec<AppSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            namespace: "storelink".to_owned(),
            encryption_key: None,
            log_filter: "info".to_owned(),
            token_leeway: Duration::ZERO,
            install: InstallConfig::default(),
            registry: RegistryConfig::default(),
            client: ClientConfig::default(),
            stats: StatsConfig::default(),
            apps: Vec::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("request_timeout", &self.request_timeout)
            .field("namespace", &self.namespace)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field("install", &self.install)
            .field("registry", &self.registry)
            .field("client", &self.client)
            .field("stats", &self.stats)
            .field("apps", &self.apps)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads defaults, then `storelink.toml`, then `STORELINK_*` variables.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be parsed or a value is invalid.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack used by [`Config::load`].
    #[must_use]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extracts and validates a configuration from `figment`.
    ///
    /// # Errors
    ///
    /// Fails when extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address built from `host` and `port`.
    ///
    /// # Errors
    ///
    /// Fails when the host is not an IP address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&format!("{}:{}", self.host, self.port)).context("Invalid server address")
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }
        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }
        self.install.validate()?;
        self.client.validate().context("invalid client configuration")?;
        self.stats.validate().context("invalid stats configuration")?;
        for app in &self.apps {
            app.to_tenant_app()?;
        }
        Ok(())
    }
}

/// Install handshake settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Public base URL of this service; the redirect URI is `{app_url}/callback`.
    pub app_url: String,
    /// Where a finished install lands.
    pub frontend_url: String,
    /// Comma-separated OAuth scopes requested at install.
    pub scopes: String,
    /// Required suffix of every shop domain.
    pub shop_suffix: String,
    /// Marks the state cookie `Secure`.
    pub secure_cookies: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:8080".to_owned(),
            frontend_url: String::new(),
            scopes: "read_products,write_products,read_orders".to_owned(),
            shop_suffix: ".myshopify.com".to_owned(),
            secure_cookies: true,
        }
    }
}

impl InstallConfig {
    fn validate(&self) -> Result<()> {
        Url::parse(&self.app_url).with_context(|| format!("install.app_url '{}' is not a URL", self.app_url))?;
        if !self.frontend_url.is_empty() {
            Url::parse(&self.frontend_url)
                .with_context(|| format!("install.frontend_url '{}' is not a URL", self.frontend_url))?;
        }
        if self.scopes.trim().is_empty() {
            anyhow::bail!("install.scopes must not be empty");
        }
        if !self.shop_suffix.starts_with('.') || self.shop_suffix.len() < 2 {
            anyhow::bail!("install.shop_suffix must start with '.'");
        }
        Ok(())
    }

    /// The OAuth redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.app_url.trim_end_matches('/'))
    }

    /// Accepts `label{shop_suffix}` where the label starts with an ASCII
    /// letter or digit and continues with letters, digits or `-`.
    #[must_use]
    pub fn parse_shop(&self, raw: &str) -> Option<PrincipalId> {
        let label = raw.strip_suffix(&self.shop_suffix)?;
        let mut chars = label.chars();
        let first = chars.next()?;
        if !first.is_ascii_alphanumeric() || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return None;
        }
        PrincipalId::parse(raw.to_ascii_lowercase()).ok()
    }
}

/// An app registered at startup.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSeed {
    /// Internal tenant id.
    pub tenant_id: String,
    /// Public client id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Human-readable name; defaults to the tenant id.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl fmt::Debug for AppSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSeed")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl AppSeed {
    /// Converts to a registry entry.
    ///
    /// # Errors
    ///
    /// Fails on an invalid tenant id or an empty client id or secret.
    pub fn to_tenant_app(&self) -> Result<TenantApp> {
        let tenant_id = TenantId::parse(&self.tenant_id).context("invalid app tenant_id")?;
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            anyhow::bail!("app '{tenant_id}' needs a client_id and a client_secret");
        }
        Ok(TenantApp {
            display_name: self.display_name.clone().unwrap_or_else(|| tenant_id.to_string()),
            tenant_id,
            public_id: self.client_id.clone(),
            secret: Zeroizing::new(self.client_secret.clone()),
            status: AppStatus::Active,
        })
    }
}
