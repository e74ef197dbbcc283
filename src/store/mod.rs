//! Storage for sealed surveys and responses
//!
//! The store only ever holds ciphertext, salts and fingerprints. Lookups
//! by response-scope id return a `SurveyShell`, which has no analysis-scope
//! field; only a lookup by analysis-scope id yields the full record.

mod sled_store;

pub use sled_store::SledStore;

use crate::access::{AnalysisScopeId, ResponseScopeId, ScopePair};
use crate::codec::EncryptedPackage;
use crate::error::Result;
use crate::id::Identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full survey row, reachable only through the analysis scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub scopes: ScopePair,
    pub package: EncryptedPackage,
    pub response_count: u64,
    pub last_response_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl SurveyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Respondent-facing view
    pub fn shell(&self) -> SurveyShell {
        SurveyShell {
            response_id: self.scopes.response,
            package: self.package.clone(),
            response_count: self.response_count,
            expires_at: self.expires_at,
        }
    }
}

/// What a response-scope holder may see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyShell {
    pub response_id: ResponseScopeId,
    pub package: EncryptedPackage,
    pub response_count: u64,
    pub expires_at: DateTime<Utc>,
}

/// An append-only sealed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub id: Identifier,
    pub survey_id: ResponseScopeId,
    pub ciphertext: Vec<u8>,
    pub submitted_at: DateTime<Utc>,
}

/// Keyed store for survey and response artifacts
pub trait ArtifactStore: Send + Sync {
    /// Insert a survey. Re-inserting an identical record is a no-op.
    fn put_survey(&self, record: &SurveyRecord) -> Result<()>;

    /// Respondent view by response-scope id
    fn survey_shell(&self, id: &ResponseScopeId) -> Result<Option<SurveyShell>>;

    /// Full record by analysis-scope id
    fn survey_by_analysis(&self, id: &AnalysisScopeId) -> Result<Option<SurveyRecord>>;

    /// Append a response and return the survey's new response count.
    /// Re-appending an identical response does not count twice.
    fn append_response(&self, record: &ResponseRecord) -> Result<u64>;

    /// All responses of a survey, oldest first
    fn responses(&self, survey: &ResponseScopeId) -> Result<Vec<ResponseRecord>>;

    /// Delete a survey and its responses, returning the number of rows removed
    fn delete_survey(&self, survey: &ResponseScopeId) -> Result<usize>;

    /// Surveys whose expiry is at or before `now`
    fn expired_surveys(&self, now: DateTime<Utc>) -> Result<Vec<ResponseScopeId>>;
}
