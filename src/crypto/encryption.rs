//! XChaCha20-Poly1305 Encryption Implementation
//!
//! Sealed output is `nonce || ciphertext || tag`. The 24-byte nonce is
//! drawn fresh from the random source on every call; it is never derived
//! from the key or a counter.

use crate::crypto::{Key, RandomSource, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key as CipherKey, XChaCha20Poly1305, XNonce};
use std::sync::Arc;

/// Authenticated cipher with random nonces
#[derive(Clone)]
pub struct AuthenticatedCipher {
    random: Arc<dyn RandomSource>,
}

impl AuthenticatedCipher {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        AuthenticatedCipher { random }
    }

    /// Encrypt `plaintext` under `key`, returning nonce-prefixed ciphertext
    pub fn seal(&self, plaintext: &[u8], key: &Key) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(CipherKey::from_slice(key.as_bytes()));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.random.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::Internal("Encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt nonce-prefixed ciphertext.
    ///
    /// Input shorter than a nonce fails with `MalformedInput` before any
    /// decryption is attempted. Wrong key, tampering and truncation all
    /// surface as the same `Authentication` error.
    pub fn open(&self, sealed: &[u8], key: &Key) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::MalformedInput(format!(
                "sealed data is {} bytes, shorter than the {}-byte nonce",
                sealed.len(),
                NONCE_SIZE
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::Authentication);
        }

        let cipher = XChaCha20Poly1305::new(CipherKey::from_slice(key.as_bytes()));
        cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{OsRandom, SeededRandom, KEY_SIZE};
    use rand::RngCore;

    fn sealed_len(len: usize) -> usize {
        NONCE_SIZE + len + TAG_SIZE
    }

    fn cipher() -> AuthenticatedCipher {
        AuthenticatedCipher::new(Arc::new(OsRandom))
    }

    fn test_key() -> Key {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Key::from_slice(&key).unwrap()
    }

    #[test]
    fn test_seal_open() {
        let key = test_key();
        let plaintext = b"Hello, sealpoll!";

        let sealed = cipher().seal(plaintext, &key).unwrap();
        let opened = cipher().open(&sealed, &key).unwrap();

        assert_eq!(opened, plaintext);
        assert_eq!(sealed.len(), sealed_len(plaintext.len()));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = cipher().seal(b"Secret data", &test_key()).unwrap();
        let result = cipher().open(&sealed, &test_key());
        assert!(matches!(result, Err(Error::Authentication)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let mut sealed = cipher().seal(b"Secret data", &key).unwrap();
        sealed[NONCE_SIZE] ^= 0x01;

        assert!(matches!(
            cipher().open(&sealed, &key),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let key = test_key();
        let mut sealed = cipher().seal(b"Secret data", &key).unwrap();
        sealed[0] ^= 0x80;

        assert!(matches!(
            cipher().open(&sealed, &key),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn test_truncated_below_nonce_is_malformed() {
        let key = test_key();
        let result = cipher().open(&[0u8; NONCE_SIZE - 1], &key);
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_truncated_tag_is_authentication_error() {
        let key = test_key();
        let sealed = cipher().seal(b"Secret data", &key).unwrap();
        let result = cipher().open(&sealed[..sealed.len() - 1], &key);
        assert!(matches!(result, Err(Error::Authentication)));

        let result = cipher().open(&sealed[..NONCE_SIZE + 3], &key);
        assert!(matches!(result, Err(Error::Authentication)));
    }

    #[test]
    fn test_nonce_not_reused() {
        let key = test_key();
        let c = cipher();
        let a = c.seal(b"same plaintext", &key).unwrap();
        let b = c.seal(b"same plaintext", &key).unwrap();

        assert_ne!(a, b);
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let key = Key::from_slice(&[7u8; KEY_SIZE]).unwrap();
        let a = AuthenticatedCipher::new(Arc::new(SeededRandom::new(42)))
            .seal(b"fixed", &key)
            .unwrap();
        let b = AuthenticatedCipher::new(Arc::new(SeededRandom::new(42)))
            .seal(b"fixed", &key)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let sealed = cipher().seal(b"", &key).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(cipher().open(&sealed, &key).unwrap().is_empty());
    }

    #[test]
    fn test_large_plaintext() {
        let key = test_key();
        let plaintext = vec![0x42u8; 1024 * 1024]; // 1MB

        let sealed = cipher().seal(&plaintext, &key).unwrap();
        let opened = cipher().open(&sealed, &key).unwrap();

        assert_eq!(opened, plaintext);
    }
}
