//! Registered tenant applications.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use storelink_storage::{TenantId, Zeroizing};

/// Review status of a registered app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Live and installable.
    #[default]
    Active,
    /// Submitted to the platform's app review.
    UnderReview,
    /// Registered but not yet submitted.
    Pending,
}

impl AppStatus {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::UnderReview => "under_review",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active" => Ok(Self::Active),
            "under_review" | "underreview" => Ok(Self::UnderReview),
            "pending" => Ok(Self::Pending),
            other => Err(format!("unknown app status '{other}'")),
        }
    }
}

/// One registered application identity.
#[derive(Clone)]
pub struct TenantApp {
    /// Internal tenant identifier.
    pub tenant_id: TenantId,
    /// Public client id; the audience of every session token for this app.
    pub public_id: String,
    /// Shared secret that signs session tokens and handshake callbacks.
    pub secret: Zeroizing<String>,
    /// Human-readable name.
    pub display_name: String,
    /// Review status.
    pub status: AppStatus,
}

impl fmt::Debug for TenantApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantApp")
            .field("tenant_id", &self.tenant_id)
            .field("public_id", &self.public_id)
            .field("secret", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("active", AppStatus::Active)]
    #[case("under_review", AppStatus::UnderReview)]
    #[case("underReview", AppStatus::UnderReview)]
    #[case("under-review", AppStatus::UnderReview)]
    #[case(" Pending ", AppStatus::Pending)]
    fn test_status_parse(#[case] raw: &str, #[case] expected: AppStatus) {
        assert_eq!(raw.parse::<AppStatus>().unwrap(), expected);
    }

    #[test]
    fn test_status_unknown() {
        assert!("retired".parse::<AppStatus>().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let app = TenantApp {
            tenant_id: TenantId::parse("t1").unwrap(),
            public_id: "pub-1".into(),
            secret: Zeroizing::new("s3cr3t".into()),
            display_name: "One".into(),
            status: AppStatus::Active,
        };
        let rendered = format!("{app:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("pub-1"));
    }
}
