//! Typed secret paths.
//!
//! Every secret lives at a `/`-separated path whose components are validated
//! on construction, so a tenant or shop identifier can never escape its
//! subtree. [`SecretNamespace`] knows the layout:
//!
//! ```text
//! {root}/apps/{tenant}/{client-id|client-secret|display-name|status}
//! {root}/shops/{tenant}/{principal}/{access-token|scopes|installed-at}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{StorageError, StorageResult},
    types::{PrincipalId, TenantId},
};

/// A validated `/`-separated secret path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretPath(String);

impl SecretPath {
    /// Parses a path, validating every component.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] when the path is empty, has
    /// empty components (leading, trailing or doubled `/`), or contains a
    /// `.`/`..` component.
    pub fn parse(raw: impl Into<String>) -> StorageResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(StorageError::invalid_path("path must not be empty"));
        }
        for component in raw.split('/') {
            validate_component(component)?;
        }
        Ok(Self(raw))
    }

    /// Appends one component.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] when `component` is not a legal
    /// single path component.
    pub fn join(&self, component: &str) -> StorageResult<Self> {
        validate_component(component)?;
        Ok(Self(format!("{}/{component}", self.0)))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the storage key for this path.
    #[must_use]
    pub fn to_key(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }

    /// Returns the key prefix that matches strictly-descendant paths.
    ///
    /// The trailing separator keeps `apps/t1` from matching `apps/t10/...`.
    #[must_use]
    pub fn descendant_prefix(&self) -> Vec<u8> {
        let mut key = self.to_key();
        key.push(b'/');
        key
    }

    /// Iterates the path components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns the final component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the components below `ancestor`, or `None` when this path is
    /// not a strict descendant of it.
    #[must_use]
    pub fn relative_to(&self, ancestor: &SecretPath) -> Option<Vec<&str>> {
        let rest = self.0.strip_prefix(ancestor.as_str())?.strip_prefix('/')?;
        Some(rest.split('/').collect())
    }
}

fn validate_component(component: &str) -> StorageResult<()> {
    if component.is_empty() {
        return Err(StorageError::invalid_path("empty path component"));
    }
    if component == "." || component == ".." {
        return Err(StorageError::invalid_path("relative path component"));
    }
    if component.contains('/') || component.chars().any(char::is_control) {
        return Err(StorageError::invalid_path(format!("illegal path component '{component}'")));
    }
    Ok(())
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SecretPath {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SecretPath> for String {
    fn from(path: SecretPath) -> Self {
        path.0
    }
}

/// Entries stored per registered app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AppField {
    /// Public client id; doubles as the token audience.
    ClientId,
    /// Shared signing secret (stored encrypted).
    ClientSecret,
    /// Human-readable name.
    DisplayName,
    /// Review status.
    Status,
}

impl AppField {
    /// Path component for this field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientId => "client-id",
            Self::ClientSecret => "client-secret",
            Self::DisplayName => "display-name",
            Self::Status => "status",
        }
    }

    /// Parses a path component back into a field.
    #[must_use]
    pub fn from_component(component: &str) -> Option<Self> {
        match component {
            "client-id" => Some(Self::ClientId),
            "client-secret" => Some(Self::ClientSecret),
            "display-name" => Some(Self::DisplayName),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Entries stored per installed shop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShopField {
    /// Access token (stored encrypted).
    AccessToken,
    /// Comma-joined granted scopes.
    Scopes,
    /// RFC 3339 install timestamp.
    InstalledAt,
}

impl ShopField {
    /// All fields, in storage order.
    pub const ALL: [ShopField; 3] = [Self::AccessToken, Self::Scopes, Self::InstalledAt];

    /// Path component for this field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access-token",
            Self::Scopes => "scopes",
            Self::InstalledAt => "installed-at",
        }
    }
}

/// Builds secret paths under one configured root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretNamespace {
    root: SecretPath,
}

impl SecretNamespace {
    /// Creates a namespace rooted at `root` (for example `storelink/prod`).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] when `root` is not a valid path.
    pub fn new(root: impl Into<String>) -> StorageResult<Self> {
        Ok(Self { root: SecretPath::parse(root)? })
    }

    /// The namespace root.
    #[must_use]
    pub fn root(&self) -> &SecretPath {
        &self.root
    }

    /// `{root}/apps`
    #[must_use]
    pub fn apps(&self) -> SecretPath {
        self.child(&["apps"])
    }

    /// `{root}/apps/{tenant}`
    #[must_use]
    pub fn app(&self, tenant: &TenantId) -> SecretPath {
        self.child(&["apps", tenant.as_str()])
    }

    /// `{root}/apps/{tenant}/{field}`
    #[must_use]
    pub fn app_field(&self, tenant: &TenantId, field: AppField) -> SecretPath {
        self.child(&["apps", tenant.as_str(), field.as_str()])
    }

    /// `{root}/shops/{tenant}`
    #[must_use]
    pub fn shops(&self, tenant: &TenantId) -> SecretPath {
        self.child(&["shops", tenant.as_str()])
    }

    /// `{root}/shops/{tenant}/{principal}`
    #[must_use]
    pub fn shop(&self, tenant: &TenantId, principal: &PrincipalId) -> SecretPath {
        self.child(&["shops", tenant.as_str(), principal.as_str()])
    }

    /// `{root}/shops/{tenant}/{principal}/{field}`
    #[must_use]
    pub fn shop_field(
        &self,
        tenant: &TenantId,
        principal: &PrincipalId,
        field: ShopField,
    ) -> SecretPath {
        self.child(&["shops", tenant.as_str(), principal.as_str(), field.as_str()])
    }

    // Tenant and principal ids are validated path components already, so
    // joining them cannot produce an invalid path.
    fn child(&self, components: &[&str]) -> SecretPath {
        let mut raw = self.root.0.clone();
        for component in components {
            raw.push('/');
            raw.push_str(component);
        }
        SecretPath(raw)
    }
}
