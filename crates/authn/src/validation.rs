//! Token algorithm validation.
//!
//! Session tokens are signed with each tenant's shared secret, so the only
//! acceptable algorithm is HS256. Everything else, `none` in particular, is
//! rejected before any signature work happens. This blocks algorithm
//! substitution where a forged header downgrades or swaps the scheme.

use crate::error::AuthError;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS384`, `HS512`: valid HMAC variants, but never issued for session tokens
/// - `RS256`, `ES256`, `EdDSA`: asymmetric; a tenant secret is not a public key
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS384", "HS512", "RS256", "ES256", "EdDSA"];

/// Accepted algorithms.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["HS256"];

/// Validate a token header's `alg` value.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] when the algorithm is
/// forbidden or simply not in [`ACCEPTED_ALGORITHMS`]. The comparison is
/// case-sensitive, so `hs256` is rejected too.
///
/// # Examples
///
/// ```
/// use storelink_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("HS256").is_ok());
/// assert!(validate_algorithm("none").is_err());
/// assert!(validate_algorithm("RS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for session tokens"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list (only HS256 is supported)"
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_hs256_accepted() {
        assert!(validate_algorithm("HS256").is_ok());
    }

    #[rstest]
    #[case("none")]
    #[case("HS384")]
    #[case("HS512")]
    #[case("RS256")]
    #[case("EdDSA")]
    fn test_forbidden_rejected(#[case] alg: &str) {
        let result = validate_algorithm(alg);
        assert!(
            matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not allowed")),
            "expected '{alg}' to be forbidden"
        );
    }

    #[rstest]
    #[case("hs256")]
    #[case("")]
    #[case("PS256")]
    fn test_unknown_rejected(#[case] alg: &str) {
        let result = validate_algorithm(alg);
        assert!(matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("accepted list")));
    }
}
