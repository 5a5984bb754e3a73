//! Session token decoding and verification.
//!
//! Session tokens are compact JWS strings (`header.payload.signature`)
//! signed with HS256 under the issuing tenant's shared secret. Verification
//! is deliberately two-phase:
//!
//! 1. [`peek_audience`] reads the `aud` claim *without* verifying anything,
//!    so the caller can find out which tenant secret to use.
//! 2. [`verify_token`] checks the algorithm and the signature with that
//!    secret and only then hands back the claims.
//!
//! Claims returned by [`peek_audience`] are untrusted and must never be used
//! for anything except choosing the verification key.
//!
//! # Example
//!
//! ```no_run
//! use storelink_authn::jwt::{peek_audience, verify_token};
//!
//! # fn example(token: &str, secret: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let audience = peek_audience(token)?;
//! let claims = verify_token(token, secret)?;
//! assert_eq!(claims.aud, audience);
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{error::AuthError, validation::validate_algorithm};

/// The fields of a session token header this crate looks at.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm.
    pub alg: String,
    /// Token type, normally `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

/// Claims carried by a session token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer: the shop admin URL that minted the token.
    pub iss: String,
    /// Destination: the shop URL; its host is the principal.
    pub dest: String,
    /// Audience: the tenant app's public client id.
    pub aud: String,
    /// Subject: the staff user the session belongs to.
    #[serde(default)]
    pub sub: String,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Not-before (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issued-at (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Unique token id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Admin session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// Splits a compact token into its three segments.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] unless there are exactly three
/// non-empty `.`-delimited segments.
pub fn split_token(token: &str) -> Result<[&str; 3], AuthError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok([header, payload, signature])
        },
        _ => Err(AuthError::invalid_token_format("token must have 3 parts separated by dots")),
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::invalid_token_format(format!("failed to decode token {what}: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("failed to parse token {what}: {e}")))
}

/// Phase one: read the audience claim of an unverified token.
///
/// Only the `aud` field is parsed, so a token with otherwise malformed
/// claims still yields its audience; the full claim set is checked after
/// the signature in [`verify_token`].
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] when the token is malformed or
/// has no non-empty string `aud`.
pub fn peek_audience(token: &str) -> Result<String, AuthError> {
    #[derive(Deserialize)]
    struct Audience {
        aud: Option<String>,
    }

    let [_, payload, _] = split_token(token)?;
    let audience: Audience = decode_segment(payload, "payload")?;
    audience
        .aud
        .filter(|aud| !aud.is_empty())
        .ok_or_else(|| AuthError::invalid_token_format("token has no audience"))
}

/// Phase two: verify the algorithm and signature with the tenant secret.
///
/// The header must declare `HS256`; any other value, `none` included, is
/// rejected before the signature is computed. The expected signature is the
/// unpadded base64url HMAC-SHA256 of `header.payload`, compared in constant
/// time. Time-based claims are checked separately by [`validate_claims`].
///
/// # Errors
///
/// - [`AuthError::InvalidTokenFormat`] for malformed tokens
/// - [`AuthError::UnsupportedAlgorithm`] for any algorithm but HS256
/// - [`AuthError::InvalidSignature`] when the signature does not match
pub fn verify_token(token: &str, secret: &[u8]) -> Result<SessionClaims, AuthError> {
    let [header_segment, payload_segment, signature] = split_token(token)?;

    let header: TokenHeader = decode_segment(header_segment, "header")?;
    validate_algorithm(&header.alg)?;

    let signing_input = &token[..header_segment.len() + 1 + payload_segment.len()];
    let valid = jsonwebtoken::crypto::verify(
        signature,
        signing_input.as_bytes(),
        &DecodingKey::from_secret(secret),
        Algorithm::HS256,
    )
    .map_err(|_| AuthError::InvalidSignature)?;
    if !valid {
        return Err(AuthError::InvalidSignature);
    }

    decode_segment(payload_segment, "payload")
}

/// Checks `exp` and `nbf` against `now`.
///
/// The token is valid while `now < exp` and from `nbf` onwards; `leeway`
/// widens both bounds.
///
/// # Errors
///
/// Returns [`AuthError::TokenExpired`] or [`AuthError::TokenNotYetValid`].
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>, leeway: Duration) -> Result<(), AuthError> {
    let now = now.timestamp();
    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);

    if claims.exp.saturating_add(leeway) <= now {
        return Err(AuthError::TokenExpired);
    }

    if let Some(nbf) = claims.nbf
        && nbf.saturating_sub(leeway) > now
    {
        return Err(AuthError::TokenNotYetValid);
    }

    Ok(())
}
