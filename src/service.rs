//! Survey lifecycle on the server side
//!
//! The server never holds a password. It stores packages sealed by the
//! creator, accepts response ciphertext from anyone holding the
//! response-scope id, and serves creator-only operations to whoever
//! presents the analysis-scope id together with a matching fingerprint.

use crate::access::{authorize_analysis, AnalysisScopeId, ResponseScopeId, ScopePair};
use crate::codec::EncryptedPackage;
use crate::config::{RetentionConfig, StorageConfig};
use crate::crypto::{Fingerprint, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::id::IdentifierGenerator;
use crate::store::{ArtifactStore, ResponseRecord, SurveyRecord, SurveyShell};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How far a package's `createdAt` may drift from the server clock
const MAX_CLOCK_SKEW_SECS: i64 = 24 * 60 * 60;

/// Identifiers returned to the creator after registering a survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSurvey {
    pub response_id: ResponseScopeId,
    pub analysis_id: AnalysisScopeId,
    pub expires_at: DateTime<Utc>,
}

/// Creator-visible statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyStats {
    pub response_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Survey service over an artifact store
pub struct SurveyService<S: ArtifactStore> {
    store: Arc<S>,
    ids: IdentifierGenerator,
    retention: RetentionConfig,
    storage: StorageConfig,
}

impl<S: ArtifactStore> SurveyService<S> {
    pub fn new(
        store: Arc<S>,
        ids: IdentifierGenerator,
        retention: RetentionConfig,
        storage: StorageConfig,
    ) -> Self {
        SurveyService {
            store,
            ids,
            retention,
            storage,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a sealed survey and mint its scope identifiers
    pub fn create_survey(&self, package: EncryptedPackage) -> Result<CreatedSurvey> {
        check_ciphertext(&package.ciphertext)?;

        let now = Utc::now();
        let skew = package.created_at.signed_duration_since(now).num_seconds();
        if skew.abs() > MAX_CLOCK_SKEW_SECS {
            return Err(Error::MalformedInput(format!(
                "package createdAt {} is too far from server time",
                package.created_at
            )));
        }

        let expires_at = now
            .checked_add_signed(self.retention.max_age())
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "retention of {} days is out of range",
                    self.retention.max_age_days
                ))
            })?;

        let scopes = ScopePair::mint(&self.ids);
        let record = SurveyRecord {
            scopes,
            package,
            response_count: 0,
            last_response_at: None,
            expires_at,
        };

        self.with_retry(|| self.store.put_survey(&record))?;
        info!("Created survey {}", scopes.response);

        Ok(CreatedSurvey {
            response_id: scopes.response,
            analysis_id: scopes.analysis,
            expires_at,
        })
    }

    /// Encrypted survey shell for respondents
    pub fn fetch_shell(&self, response_id: &ResponseScopeId) -> Result<SurveyShell> {
        self.with_retry(|| self.store.survey_shell(response_id))?
            .filter(|shell| shell.expires_at > Utc::now())
            .ok_or_else(|| Error::NotFound(format!("survey {}", response_id)))
    }

    /// Accept a response sealed client-side and return the new count
    pub fn submit_response(&self, response_id: &ResponseScopeId, ciphertext: Vec<u8>) -> Result<u64> {
        check_ciphertext(&ciphertext)?;
        self.fetch_shell(response_id)?;

        let record = ResponseRecord {
            id: self.ids.generate(),
            survey_id: *response_id,
            ciphertext,
            submitted_at: Utc::now(),
        };
        let count = self.with_retry(|| self.store.append_response(&record))?;
        debug!("Survey {} now has {} responses", response_id, count);
        Ok(count)
    }

    /// Package for an analysis scope, so the creator can compute a proof.
    ///
    /// The package is already public to respondents; returning it here
    /// grants nothing without the password.
    pub fn challenge(&self, analysis_id: &AnalysisScopeId) -> Result<EncryptedPackage> {
        let record = self.live_record(analysis_id)?;
        Ok(record.package)
    }

    /// Sealed responses, for the creator
    pub fn list_responses(
        &self,
        analysis_id: &AnalysisScopeId,
        proof: &Fingerprint,
    ) -> Result<Vec<ResponseRecord>> {
        let record = self.authorized(analysis_id, proof)?;
        self.with_retry(|| self.store.responses(&record.scopes.response))
    }

    /// Response statistics, for the creator
    pub fn stats(&self, analysis_id: &AnalysisScopeId, proof: &Fingerprint) -> Result<SurveyStats> {
        let record = self.authorized(analysis_id, proof)?;
        Ok(SurveyStats {
            response_count: record.response_count,
            created_at: record.package.created_at,
            last_response_at: record.last_response_at,
            expires_at: record.expires_at,
        })
    }

    /// Delete a survey and all its responses, for the creator
    pub fn delete_survey(&self, analysis_id: &AnalysisScopeId, proof: &Fingerprint) -> Result<usize> {
        let record = self.authorized(analysis_id, proof)?;
        let removed = self.with_retry(|| self.store.delete_survey(&record.scopes.response))?;
        info!("Creator deleted survey {} ({} rows)", record.scopes.response, removed);
        Ok(removed)
    }

    /// Remove every survey whose retention has lapsed.
    ///
    /// Returns the number of surveys removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.with_retry(|| self.store.expired_surveys(now))?;
        let mut removed = 0;
        for id in &expired {
            match self.with_retry(|| self.store.delete_survey(id)) {
                Ok(rows) if rows > 0 => removed += 1,
                Ok(_) => {}
                Err(e) => warn!("Retention sweep failed for survey {}: {}", id, e),
            }
        }
        if removed > 0 {
            info!("Retention sweep removed {} surveys", removed);
        }
        Ok(removed)
    }

    /// Resolve an analysis scope, treating lapsed surveys as absent
    fn live_record(&self, analysis_id: &AnalysisScopeId) -> Result<SurveyRecord> {
        self.with_retry(|| self.store.survey_by_analysis(analysis_id))?
            .filter(|record| !record.is_expired(Utc::now()))
            .ok_or(Error::Unauthorized)
    }

    fn authorized(&self, analysis_id: &AnalysisScopeId, proof: &Fingerprint) -> Result<SurveyRecord> {
        let record = self.live_record(analysis_id)?;
        authorize_analysis(analysis_id, &record.package.fingerprint, proof)?;
        Ok(record)
    }

    /// Run a storage call, retrying transient failures with backoff
    fn with_retry<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.storage.retry_attempts => {
                    let delay = self.storage.retry_base_delay_ms.saturating_mul(1 << attempt.min(16));
                    warn!("Transient storage error (attempt {}): {}", attempt + 1, e);
                    std::thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Reject ciphertext that cannot hold a nonce and tag
fn check_ciphertext(ciphertext: &[u8]) -> Result<()> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::MalformedInput(format!(
            "ciphertext is {} bytes, minimum is {}",
            ciphertext.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }
    Ok(())
}
