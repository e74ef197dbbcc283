//! Key and salt types
//!
//! - Key: 32 bytes derived from a password, zeroized on drop, never serialized
//! - Salt: 16 public random bytes stored next to the artifact

use crate::crypto::{RandomSource, KEY_SIZE, SALT_SIZE};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Symmetric key derived from a password
pub struct Key {
    bytes: Zeroizing<[u8; KEY_SIZE]>,
}

impl Key {
    /// Wrap raw key material
    pub(crate) fn from_zeroizing(bytes: Zeroizing<[u8; KEY_SIZE]>) -> Self {
        Key { bytes }
    }

    /// Create a key from a byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: KEY_SIZE,
                got: bytes.len(),
            });
        }
        let mut arr = Zeroizing::new([0u8; KEY_SIZE]);
        arr.copy_from_slice(bytes);
        Ok(Key { bytes: arr })
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Key([REDACTED])")
    }
}

/// Per-artifact key derivation salt
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Draw a new salt from the random source
    pub fn generate(random: &dyn RandomSource) -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        random.fill_bytes(&mut bytes);
        Salt(bytes)
    }

    /// Create a salt from a byte slice of exactly `SALT_SIZE` bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SALT_SIZE] = bytes.try_into().map_err(|_| {
            Error::Derivation(format!(
                "salt must be {} bytes, got {}",
                SALT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Salt(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", hex::encode(self.0))
    }
}
