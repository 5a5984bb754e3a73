//! Common types used across storage operations.
//!
//! Besides the raw [`KeyValue`] pair returned by prefix scans, this module
//! defines the validated identifiers that make up every secret path:
//! [`TenantId`] (one registered app identity) and [`PrincipalId`] (one
//! merchant shop, identified by its host name).

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::error::StorageError;

/// Key-value pair returned from prefix queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    ///
    /// ```
    /// use bytes::Bytes;
    /// use storelink_storage::KeyValue;
    ///
    /// let kv = KeyValue::new(Bytes::from("key"), Bytes::from("value"));
    /// assert_eq!(kv.value, Bytes::from("value"));
    /// ```
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// An identifier failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}': {reason}")]
pub struct InvalidId {
    /// Which identifier type rejected the input.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl From<InvalidId> for StorageError {
    fn from(err: InvalidId) -> Self {
        StorageError::invalid_path(err.to_string())
    }
}

fn check_component(kind: &'static str, value: &str) -> Result<(), InvalidId> {
    let reject = |reason| Err(InvalidId { kind, value: value.to_owned(), reason });

    if value.is_empty() {
        return reject("must not be empty");
    }
    if value == "." || value == ".." {
        return reject("must not be a relative path segment");
    }
    if value.contains('/') {
        return reject("must not contain '/'");
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return reject("must not contain whitespace or control characters");
    }
    Ok(())
}

/// Macro to define a validated string identifier usable as a path component.
///
/// Each generated type:
/// - Wraps a `String` that passed `$validate`
/// - Derives `Clone`, `Debug`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Serializes transparently and re-validates on deserialize
/// - Implements `FromStr`, `TryFrom<String>`, `AsRef<str>` and `Display`
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $validate:path) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validates `value` and wraps it.
            ///
            /// # Errors
            ///
            /// Returns [`InvalidId`] when the value is not a legal identifier.
            pub fn parse(value: impl AsRef<str>) -> Result<Self, InvalidId> {
                $validate(value.as_ref()).map(Self)
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

fn validate_tenant(value: &str) -> Result<String, InvalidId> {
    check_component("tenant id", value)?;
    Ok(value.to_owned())
}

fn validate_principal(value: &str) -> Result<String, InvalidId> {
    const KIND: &str = "principal id";
    let host = value.to_ascii_lowercase();
    check_component(KIND, &host)?;

    let reject = |reason| Err(InvalidId { kind: KIND, value: value.to_owned(), reason });

    if host.len() > 253 {
        return reject("host name too long");
    }
    for label in host.split('.') {
        if label.is_empty() || label.len() > 63 {
            return reject("host labels must be 1-63 characters");
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return reject("host labels may only contain letters, digits and '-'");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return reject("host labels must not start or end with '-'");
        }
    }
    Ok(host)
}

define_id!(
    /// Identifier of one registered application identity (a tenant).
    ///
    /// ```
    /// use storelink_storage::TenantId;
    ///
    /// let tenant = TenantId::parse("t1").unwrap();
    /// assert_eq!(tenant.as_str(), "t1");
    /// assert!(TenantId::parse("..").is_err());
    /// assert!(TenantId::parse("a/b").is_err());
    /// ```
    TenantId,
    validate_tenant
);

define_id!(
    /// Identifier of one merchant shop: its lower-cased DNS host name.
    ///
    /// ```
    /// use storelink_storage::PrincipalId;
    ///
    /// let shop = PrincipalId::parse("Acme.MyShopify.com").unwrap();
    /// assert_eq!(shop.as_str(), "acme.myshopify.com");
    /// assert!(PrincipalId::parse("acme..com").is_err());
    /// ```
    PrincipalId,
    validate_principal
);
