//! Cryptography module for sealpoll
//!
//! Provides XChaCha20-Poly1305 encryption with Argon2id key derivation
//! and an HMAC-SHA256 key fingerprint. Keys are derived from a password
//! and never leave the call that derived them.

mod encryption;
mod fingerprint;
mod kdf;
mod keys;
mod random;

use crate::config::EncryptionConfig;
use crate::error::Result;
use std::sync::Arc;

pub use encryption::AuthenticatedCipher;
pub use fingerprint::{Fingerprint, KeyVerifier};
pub use kdf::{KdfParams, KeyDerivation};
pub use keys::{Key, Salt};
pub use random::{OsRandom, RandomSource, SeededRandom};

/// Size of XChaCha20-Poly1305 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of XChaCha20 nonce in bytes
pub const NONCE_SIZE: usize = 24;

/// Size of Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Size of salt for key derivation
pub const SALT_SIZE: usize = 16;

/// Size of a key fingerprint in bytes
pub const FINGERPRINT_SIZE: usize = 32;

/// Process-wide crypto context.
///
/// Built once at startup and immutable afterwards. Every component that
/// needs randomness gets it from here, so tests can swap in a seeded source.
pub struct CryptoProvider {
    random: Arc<dyn RandomSource>,
    kdf: KeyDerivation,
    cipher: AuthenticatedCipher,
}

impl CryptoProvider {
    /// Create a provider from explicit parts
    pub fn new(random: Arc<dyn RandomSource>, params: KdfParams) -> Result<Self> {
        let kdf = KeyDerivation::new(params)?;
        let cipher = AuthenticatedCipher::new(Arc::clone(&random));
        Ok(CryptoProvider {
            random,
            kdf,
            cipher,
        })
    }

    /// Create a provider backed by the OS random generator
    pub fn from_config(config: &EncryptionConfig) -> Result<Self> {
        Self::new(Arc::new(OsRandom), KdfParams::from_config(config))
    }

    pub fn random(&self) -> &Arc<dyn RandomSource> {
        &self.random
    }

    pub fn kdf(&self) -> &KeyDerivation {
        &self.kdf
    }

    pub fn cipher(&self) -> &AuthenticatedCipher {
        &self.cipher
    }

    /// Generate a fresh random salt
    pub fn generate_salt(&self) -> Salt {
        Salt::generate(self.random.as_ref())
    }
}

/// Provider with cheap Argon2 parameters for unit tests
#[cfg(test)]
pub(crate) fn test_provider() -> Arc<CryptoProvider> {
    Arc::new(CryptoProvider::new(Arc::new(OsRandom), KdfParams::testing()).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_config() {
        let config = EncryptionConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            ..EncryptionConfig::default()
        };
        let provider = CryptoProvider::from_config(&config).unwrap();
        assert_eq!(provider.kdf().params().memory_kib, 1024);
    }

    #[test]
    fn test_provider_salts_differ() {
        let provider = test_provider();
        let a = provider.generate_salt();
        let b = provider.generate_salt();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
