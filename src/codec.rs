//! Sealing and opening of encrypted artifacts
//!
//! An artifact is any serde value sealed under a password. The stored
//! package carries everything needed to re-derive the key except the
//! password itself:
//!
//! ```text
//! EncryptedPackage (JSON, byte fields as arrays of integers 0-255)
//! {
//!   "id":          "01J2...",      26-char identifier
//!   "salt":        [16 bytes],     Argon2id salt
//!   "ciphertext":  [24-byte nonce || sealed content || 16-byte tag],
//!   "fingerprint": [32 bytes],     HMAC-SHA256 of the derived key
//!   "createdAt":   "2026-...Z"     RFC 3339
//! }
//! ```
//!
//! Keys live only inside a single seal/open call and are zeroized when it
//! returns.

use crate::config::PasswordPolicy;
use crate::crypto::{CryptoProvider, Fingerprint, Key, KeyVerifier, Salt};
use crate::error::{Error, Result};
use crate::id::{Identifier, IdentifierGenerator};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Stored form of a sealed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPackage {
    pub id: Identifier,
    pub salt: Salt,
    pub ciphertext: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
}

impl EncryptedPackage {
    /// Encode for transport
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from transport
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::MalformedInput(format!("invalid package: {}", e)))
    }
}

/// Orchestrates derivation, encryption and fingerprinting
#[derive(Clone)]
pub struct ArtifactCodec {
    provider: Arc<CryptoProvider>,
    ids: IdentifierGenerator,
    policy: PasswordPolicy,
}

impl ArtifactCodec {
    pub fn new(provider: Arc<CryptoProvider>, policy: PasswordPolicy) -> Self {
        let ids = IdentifierGenerator::new(Arc::clone(provider.random()));
        ArtifactCodec {
            provider,
            ids,
            policy,
        }
    }

    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    pub fn ids(&self) -> &IdentifierGenerator {
        &self.ids
    }

    /// Seal a value under a password into a new package
    pub fn seal_artifact<T: Serialize>(&self, content: &T, password: &str) -> Result<EncryptedPackage> {
        self.policy.check(password)?;

        let salt = self.provider.generate_salt();
        let key = self.provider.kdf().derive(password, &salt)?;

        let serialized = serde_json::to_vec(content)?;
        let ciphertext = self.provider.cipher().seal(&serialized, &key)?;
        let fingerprint = KeyVerifier::fingerprint(&key);
        drop(key);

        let id = self.ids.generate();
        debug!("Sealed artifact {} ({} bytes)", id, ciphertext.len());

        Ok(EncryptedPackage {
            id,
            salt,
            ciphertext,
            fingerprint,
            created_at: Utc::now(),
        })
    }

    /// Open a package with a password.
    ///
    /// A wrong password is caught by the fingerprint check before any
    /// decryption is attempted.
    pub fn open_artifact<T: DeserializeOwned>(&self, pkg: &EncryptedPackage, password: &str) -> Result<T> {
        let key = self.unlock(pkg, password)?;
        let plaintext = self.decrypt(pkg.id, &pkg.ciphertext, &key)?;
        drop(key);

        serde_json::from_slice(&plaintext).map_err(|e| Error::MalformedContent(e.to_string()))
    }

    /// Derive the fingerprint proof for a package.
    ///
    /// Fails with `WrongPassword` unless the password matches the package.
    pub fn prove(&self, pkg: &EncryptedPackage, password: &str) -> Result<Fingerprint> {
        let key = self.unlock(pkg, password)?;
        Ok(KeyVerifier::fingerprint(&key))
    }

    /// Seal a respondent's answers under the survey's password.
    ///
    /// The key is re-derived with the survey's salt, so only holders of
    /// the survey password can later open the response.
    pub fn seal_response<T: Serialize>(&self, content: &T, survey: &EncryptedPackage, password: &str) -> Result<Vec<u8>> {
        let key = self.unlock(survey, password)?;
        let serialized = serde_json::to_vec(content)?;
        self.provider.cipher().seal(&serialized, &key)
    }

    /// Open a response ciphertext sealed against `survey`
    pub fn open_response<T: DeserializeOwned>(
        &self,
        response_id: Identifier,
        ciphertext: &[u8],
        survey: &EncryptedPackage,
        password: &str,
    ) -> Result<T> {
        let key = self.unlock(survey, password)?;
        let plaintext = self.decrypt(response_id, ciphertext, &key)?;
        serde_json::from_slice(&plaintext).map_err(|e| Error::MalformedContent(e.to_string()))
    }

    /// Derive the key for `pkg` and confirm it against the stored fingerprint
    fn unlock(&self, pkg: &EncryptedPackage, password: &str) -> Result<Key> {
        if password.is_empty() {
            return Err(Error::WrongPassword);
        }
        if password.chars().count() > self.policy.max_length {
            // Never valid at seal time; skip the expensive derivation
            return Err(Error::WrongPassword);
        }

        let key = self.provider.kdf().derive(password, &pkg.salt)?;
        if !KeyVerifier::verify(&key, &pkg.fingerprint) {
            debug!("Fingerprint mismatch for artifact {}", pkg.id);
            return Err(Error::WrongPassword);
        }
        Ok(key)
    }

    fn decrypt(&self, artifact_id: Identifier, ciphertext: &[u8], key: &Key) -> Result<Vec<u8>> {
        self.provider
            .cipher()
            .open(ciphertext, key)
            .map_err(|e| match e {
                Error::Authentication => {
                    error!("Artifact {} failed authentication despite fingerprint match", artifact_id);
                    Error::CorruptedData {
                        artifact_id: artifact_id.to_string(),
                    }
                }
                other => other,
            })
    }
}
