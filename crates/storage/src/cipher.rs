//! Authenticated encryption for secret values.
//!
//! [`SecretCipher`] seals values with ChaCha20-Poly1305 under a single
//! 256-bit key. Each seal draws a fresh random 96-bit nonce, and the caller
//! supplies associated data (the secret path) that must match on open, so a
//! ciphertext copied to another path fails authentication.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Output of [`SecretCipher::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// The random nonce used for this seal.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the Poly1305 tag appended.
    pub ciphertext: Vec<u8>,
}

/// ChaCha20-Poly1305 cipher for secret values.
#[derive(Clone)]
pub struct SecretCipher {
    aead: ChaCha20Poly1305,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").field("key", &"[REDACTED]").finish()
    }
}

impl SecretCipher {
    /// Creates a cipher from raw key bytes.
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self { aead: ChaCha20Poly1305::new(key.into()) }
    }

    /// Creates a cipher from a standard base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Crypto`] when the input is not valid base64
    /// or does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> StorageResult<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| StorageError::crypto("encryption key is not valid base64"))?,
        );
        let key: Zeroizing<[u8; KEY_LEN]> = Zeroizing::new(
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| StorageError::crypto(format!("encryption key must be {KEY_LEN} bytes")))?,
        );
        Ok(Self::new(&key))
    }

    /// Encrypts `plaintext`, binding it to `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Crypto`] if the AEAD rejects the input.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> StorageResult<Sealed> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| StorageError::crypto("failed to encrypt secret"))?;
        Ok(Sealed { nonce, ciphertext })
    }

    /// Decrypts a sealed value that was bound to `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Crypto`] when the nonce length is wrong, the
    /// key differs, the ciphertext was altered, or `aad` does not match.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> StorageResult<Zeroizing<Vec<u8>>> {
        if nonce.len() != NONCE_LEN {
            return Err(StorageError::crypto("nonce length is invalid"));
        }
        self.aead
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map(Zeroizing::new)
            .map_err(|_| StorageError::crypto("failed to decrypt secret"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(&[7u8; KEY_LEN])
    }

    #[test]
    fn test_seal_open() {
        let sealed = cipher().seal(b"shpat_123", b"apps/t1/client-secret").unwrap();
        assert_ne!(sealed.ciphertext.as_slice(), b"shpat_123");

        let opened = cipher().open(&sealed.nonce, &sealed.ciphertext, b"apps/t1/client-secret").unwrap();
        assert_eq!(opened.as_slice(), b"shpat_123");
    }

    #[test]
    fn test_nonces_differ() {
        let a = cipher().seal(b"x", b"p").unwrap();
        let b = cipher().seal(b"x", b"p").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let sealed = cipher().seal(b"secret", b"apps/t1/client-secret").unwrap();
        let err = cipher().open(&sealed.nonce, &sealed.ciphertext, b"apps/t2/client-secret");
        assert!(matches!(err, Err(StorageError::Crypto { .. })));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = cipher().seal(b"secret", b"p").unwrap();
        let other = SecretCipher::new(&[8u8; KEY_LEN]);
        assert!(other.open(&sealed.nonce, &sealed.ciphertext, b"p").is_err());
    }

    #[test]
    fn test_from_base64() {
        let encoded = STANDARD.encode([1u8; KEY_LEN]);
        assert!(SecretCipher::from_base64(&encoded).is_ok());
        assert!(SecretCipher::from_base64(&STANDARD.encode([1u8; 16])).is_err());
        assert!(SecretCipher::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_debug_redacts() {
        assert!(format!("{:?}", cipher()).contains("REDACTED"));
    }
}
