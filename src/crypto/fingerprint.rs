//! Key fingerprints
//!
//! A fingerprint is HMAC-SHA256 keyed by the derived key over a fixed
//! label. The server stores only this value: it proves the right password
//! was used and doubles as the creator's bearer credential.

use crate::crypto::{Key, FINGERPRINT_SIZE};
use crate::error::{Error, Result};
use ring::hmac;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Domain label mixed into every fingerprint
const FINGERPRINT_LABEL: &[u8] = b"sealpoll-key-fingerprint-v1";

/// One-way digest of a derived key
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    /// Hex form used when the fingerprint travels as a bearer token
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::MalformedInput(format!("fingerprint is not hex: {}", e)))?;
        let arr: [u8; FINGERPRINT_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "fingerprint must be {} bytes, got {}",
                FINGERPRINT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Fingerprint(arr))
    }
}

impl ConstantTimeEq for Fingerprint {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0[..].ct_eq(&other.0[..])
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Fingerprint {}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({}..)", hex::encode(&self.0[..4]))
    }
}

/// Computes and checks key fingerprints
pub struct KeyVerifier;

impl KeyVerifier {
    /// Fingerprint a key. Deterministic and not invertible.
    pub fn fingerprint(key: &Key) -> Fingerprint {
        let mac_key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
        let tag = hmac::sign(&mac_key, FINGERPRINT_LABEL);

        let mut out = [0u8; FINGERPRINT_SIZE];
        out.copy_from_slice(tag.as_ref());
        Fingerprint(out)
    }

    /// Check a key against an expected fingerprint in constant time
    pub fn verify(key: &Key, expected: &Fingerprint) -> bool {
        Self::fingerprint(key).ct_eq(expected).into()
    }
}
