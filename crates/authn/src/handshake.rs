//! Install handshake signatures and the correlation token.
//!
//! The merchant platform signs three kinds of inbound request with the
//! tenant secret, and each uses a different canonical form:
//!
//! | Request | Canonical form | Digest |
//! |---------|----------------|--------|
//! | OAuth callback | params minus `hmac`/`signature`, sorted, `k=v` joined by `&` | hex |
//! | App proxy | params minus `signature`, sorted, `k=v` concatenated | hex |
//! | Webhook | raw request body | base64 |
//!
//! All comparisons are constant time.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use storelink_storage::TenantId;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Canonicalisation used for a signed query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStyle {
    /// OAuth install callback: drop `hmac` and `signature`, join with `&`.
    OAuth,
    /// App proxy request: drop `signature`, no separator.
    Proxy,
}

impl SignatureStyle {
    fn excluded(self, key: &str) -> bool {
        match self {
            Self::OAuth => key == "hmac" || key == "signature",
            Self::Proxy => key == "signature",
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Self::OAuth => "&",
            Self::Proxy => "",
        }
    }
}

/// Builds the canonical message for `params` under `style`.
pub fn canonical_message<'a, I>(params: I, style: SignatureStyle) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> =
        params.into_iter().filter(|(key, _)| !style.excluded(key)).collect();
    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(style.separator())
}

fn mac(secret: &[u8], message: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(mac)
}

fn digest(secret: &[u8], message: &[u8]) -> Vec<u8> {
    mac(secret, message).map(|mac| mac.finalize().into_bytes().to_vec()).unwrap_or_default()
}

/// Computes the lowercase hex signature of `params`.
pub fn compute_signature<'a, I>(params: I, secret: &[u8], style: SignatureStyle) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let message = canonical_message(params, style);
    hex::encode(digest(secret, message.as_bytes()))
}

/// Verifies a signed callback or proxy query string.
///
/// `params` may include the signature parameter itself; it is excluded
/// from the canonical message either way.
pub fn verify_callback<'a, I>(params: I, signature: &str, secret: &[u8], style: SignatureStyle) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };

    let message = canonical_message(params, style);
    let Some(mac) = mac(secret, message.as_bytes()) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Verifies a webhook body against its base64 `X-Shopify-Hmac-Sha256` header.
pub fn verify_webhook(body: &[u8], header: &str, secret: &[u8]) -> bool {
    let Ok(expected) = STANDARD.decode(header.trim()) else {
        return false;
    };

    let Some(mac) = mac(secret, body) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Computes the base64 webhook signature of `body`.
pub fn compute_webhook_signature(body: &[u8], secret: &[u8]) -> String {
    STANDARD.encode(digest(secret, body))
}

/// Opaque `state` value carried through the install redirect.
///
/// Binds the redirect to the tenant that started it and to a random nonce
/// that the browser also holds in a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationToken {
    /// 16 random bytes, hex encoded.
    pub nonce: String,
    /// Tenant that initiated the install.
    pub tenant_id: TenantId,
}

impl CorrelationToken {
    /// Issues a token with a fresh random nonce.
    #[must_use]
    pub fn issue(tenant_id: TenantId) -> Self {
        let nonce: [u8; 16] = rand::random();
        Self { nonce: hex::encode(nonce), tenant_id }
    }

    /// Encodes the token as unpadded base64url JSON.
    #[must_use]
    pub fn encode(&self) -> String {
        // Serializing two strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a token produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCorrelationToken`] for bad base64, bad
    /// JSON, an empty nonce or an invalid tenant id.
    pub fn decode(raw: &str) -> Result<Self, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim().trim_end_matches('='))
            .map_err(|e| AuthError::invalid_correlation_token(format!("bad encoding: {e}")))?;
        let token: Self = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::invalid_correlation_token(format!("bad payload: {e}")))?;
        if token.nonce.is_empty() {
            return Err(AuthError::invalid_correlation_token("empty nonce"));
        }
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    const PARAMS: [(&str, &str); 3] =
        [("shop", "a.example.com"), ("code", "abc"), ("timestamp", "100")];

    fn reference_signature() -> String {
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(b"code=abc&shop=a.example.com&timestamp=100");
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_oauth_canonical_form() {
        let with_sig = PARAMS.into_iter().chain([("hmac", "ffff"), ("signature", "eeee")]);
        assert_eq!(
            canonical_message(with_sig, SignatureStyle::OAuth),
            "code=abc&shop=a.example.com&timestamp=100"
        );
    }

    #[test]
    fn test_proxy_canonical_form_keeps_hmac_param() {
        let params = [("shop", "a.example.com"), ("hmac", "x"), ("signature", "y"), ("path_prefix", "/apps/x")];
        assert_eq!(
            canonical_message(params, SignatureStyle::Proxy),
            "hmac=xpath_prefix=/apps/xshop=a.example.com"
        );
    }

    #[test]
    fn test_reference_vector() {
        let expected = reference_signature();
        assert_eq!(compute_signature(PARAMS, b"s3cr3t", SignatureStyle::OAuth), expected);
        assert!(verify_callback(PARAMS, &expected, b"s3cr3t", SignatureStyle::OAuth));
        assert!(verify_callback(PARAMS, &expected.to_uppercase(), b"s3cr3t", SignatureStyle::OAuth));
    }

    #[test]
    fn test_styles_are_not_interchangeable() {
        let oauth = compute_signature(PARAMS, b"s3cr3t", SignatureStyle::OAuth);
        assert!(!verify_callback(PARAMS, &oauth, b"s3cr3t", SignatureStyle::Proxy));
    }

    #[test]
    fn test_rejects_garbage_signature() {
        assert!(!verify_callback(PARAMS, "zz-not-hex", b"s3cr3t", SignatureStyle::OAuth));
        assert!(!verify_callback(PARAMS, "", b"s3cr3t", SignatureStyle::OAuth));
    }

    #[rstest::rstest]
    #[case(&[])]
    #[case(&[7u8; 200])]
    fn test_any_secret_length_signs(#[case] secret: &[u8]) {
        let signature = compute_signature(PARAMS, secret, SignatureStyle::OAuth);
        assert_eq!(signature.len(), 64);
        assert!(verify_callback(PARAMS, &signature, secret, SignatureStyle::OAuth));

        let header = compute_webhook_signature(b"{}", secret);
        assert!(verify_webhook(b"{}", &header, secret));
    }

    #[test]
    fn test_webhook_round_trip() {
        let body = br#"{"shop_domain":"a.example.com"}"#;
        let header = compute_webhook_signature(body, b"s3cr3t");
        assert!(verify_webhook(body, &header, b"s3cr3t"));
        assert!(!verify_webhook(b"{}", &header, b"s3cr3t"));
        assert!(!verify_webhook(body, &header, b"other"));
        assert!(!verify_webhook(body, "%%%", b"s3cr3t"));
    }

    #[test]
    fn test_correlation_token_round_trip() {
        let token = CorrelationToken::issue(TenantId::parse("t1").unwrap());
        assert_eq!(token.nonce.len(), 32);

        let decoded = CorrelationToken::decode(&token.encode()).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_correlation_nonces_differ() {
        let tenant = TenantId::parse("t1").unwrap();
        assert_ne!(CorrelationToken::issue(tenant.clone()).nonce, CorrelationToken::issue(tenant).nonce);
    }

    #[test]
    fn test_correlation_token_malformed() {
        let cases = [
            String::new(),
            "!!!".to_owned(),
            URL_SAFE_NO_PAD.encode(b"not json"),
            URL_SAFE_NO_PAD.encode(br#"{"nonce":"","tenant_id":"t1"}"#),
            URL_SAFE_NO_PAD.encode(br#"{"nonce":"ab","tenant_id":"../x"}"#),
        ];
        for raw in &cases {
            assert!(
                matches!(CorrelationToken::decode(raw), Err(AuthError::InvalidCorrelationToken(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn any_single_char_change_in_params_fails(
                index in 0usize..3,
                replacement in "[a-z0-9.]",
                position in any::<prop::sample::Index>(),
            ) {
                let signature = reference_signature();

                let mut params: Vec<(String, String)> =
                    PARAMS.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
                let value = &mut params[index].1;
                let at = position.index(value.len());
                let original = value.chars().nth(at).unwrap();
                prop_assume!(replacement.chars().next() != Some(original));
                value.replace_range(at..=at, &replacement);

                let pairs = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
                prop_assert!(!verify_callback(pairs, &signature, b"s3cr3t", SignatureStyle::OAuth));
            }

            #[test]
            fn any_single_char_change_in_signature_fails(
                position in 0usize..64,
                nibble in 0u32..16,
            ) {
                let signature = reference_signature();
                let replacement = char::from_digit(nibble, 16).unwrap();
                prop_assume!(signature.chars().nth(position) != Some(replacement));

                let mut mutated = signature.clone();
                mutated.replace_range(position..=position, &replacement.to_string());
                prop_assert!(!verify_callback(PARAMS, &mutated, b"s3cr3t", SignatureStyle::OAuth));
            }
        }
    }
}
