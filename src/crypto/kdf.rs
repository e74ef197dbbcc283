//! Argon2id key derivation
//!
//! Turns (password, salt) into a 32-byte key. Cost parameters are fixed
//! per deployment and come from `EncryptionConfig`.

use crate::config::EncryptionConfig;
use crate::crypto::{Key, Salt, KEY_SIZE, SALT_SIZE};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Time cost (passes over memory)
    pub iterations: u32,
    /// Lanes
    pub parallelism: u32,
}

impl KdfParams {
    pub fn from_config(config: &EncryptionConfig) -> Self {
        KdfParams {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }

    /// Cheap parameters for tests. Far too weak for real data.
    pub fn testing() -> Self {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn to_argon2(self) -> Result<Params> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| Error::Derivation(format!("invalid Argon2 parameters: {}", e)))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from_config(&EncryptionConfig::default())
    }
}

/// Password-based key derivation
#[derive(Debug, Clone)]
pub struct KeyDerivation {
    params: KdfParams,
    argon2_params: Params,
}

impl KeyDerivation {
    /// Create a deriver, rejecting parameters Argon2 would refuse
    pub fn new(params: KdfParams) -> Result<Self> {
        let argon2_params = params.to_argon2()?;
        Ok(KeyDerivation {
            params,
            argon2_params,
        })
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Derive a key from a password and salt.
    ///
    /// Deterministic for a given (password, salt). Empty passwords are a
    /// caller bug and fail with `Error::Derivation`.
    pub fn derive(&self, password: &str, salt: &Salt) -> Result<Key> {
        self.derive_raw(password.as_bytes(), salt.as_bytes())
    }

    /// Derive from raw bytes, checking the salt length first
    pub fn derive_raw(&self, password: &[u8], salt: &[u8]) -> Result<Key> {
        if password.is_empty() {
            return Err(Error::Derivation("password must not be empty".to_string()));
        }
        if salt.len() != SALT_SIZE {
            return Err(Error::Derivation(format!(
                "salt must be {} bytes, got {}",
                SALT_SIZE,
                salt.len()
            )));
        }

        let argon2 = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            self.argon2_params.clone(),
        );

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        argon2
            .hash_password_into(password, salt, &mut key[..])
            .map_err(|e| Error::Derivation(format!("Argon2 failed: {}", e)))?;

        Ok(Key::from_zeroizing(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kdf() -> KeyDerivation {
        KeyDerivation::new(KdfParams::testing()).unwrap()
    }

    fn salt(byte: u8) -> Salt {
        Salt::from_slice(&[byte; SALT_SIZE]).unwrap()
    }

    #[test]
    fn test_derive_deterministic() {
        let kdf = kdf();
        let k1 = kdf.derive("password123", &salt(1)).unwrap();
        let k2 = kdf.derive("password123", &salt(1)).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let kdf = kdf();
        let k1 = kdf.derive("password123", &salt(1)).unwrap();
        let k2 = kdf.derive("password123", &salt(2)).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_password_different_key() {
        let kdf = kdf();
        let k1 = kdf.derive("password123", &salt(1)).unwrap();
        let k2 = kdf.derive("password124", &salt(1)).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_empty_password_rejected() {
        let result = kdf().derive("", &salt(1));
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_bad_salt_length_rejected() {
        let result = kdf().derive_raw(b"password123", &[0u8; 8]);
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = KdfParams {
            memory_kib: 1,
            iterations: 1,
            parallelism: 1,
        };
        assert!(matches!(
            KeyDerivation::new(params),
            Err(Error::Derivation(_))
        ));
    }

    #[test]
    fn test_params_affect_output() {
        let weak = kdf().derive("password123", &salt(3)).unwrap();
        let stronger = KeyDerivation::new(KdfParams {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap()
        .derive("password123", &salt(3))
        .unwrap();
        assert_ne!(weak.as_bytes(), stronger.as_bytes());
    }
}
