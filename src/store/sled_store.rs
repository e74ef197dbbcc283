//! Sled-based artifact store
//!
//! Trees:
//! - `surveys`: response-scope id -> SurveyRecord
//! - `analysis_index`: analysis-scope id -> response-scope id
//! - `responses`: response-scope id || response id -> ResponseRecord

use crate::access::{AnalysisScopeId, ResponseScopeId};
use crate::error::{Error, Result};
use crate::store::{ArtifactStore, ResponseRecord, SurveyRecord, SurveyShell};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<Error>>;

fn abort<E: Into<Error>>(e: E) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(e.into())
}

/// Artifact store backed by sled
pub struct SledStore {
    db: Db,
    surveys: Tree,
    analysis_index: Tree,
    responses: Tree,
    /// Keeps the cascade delete's prefix scan and its transaction together
    write_lock: Mutex<()>,
    #[cfg(test)]
    fail_next_write: std::sync::atomic::AtomicBool,
}

impl SledStore {
    /// Open or create a store on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        let store = Self::from_db(db)?;
        info!(
            "Artifact store opened at {:?}, {} surveys",
            path.as_ref(),
            store.surveys.len()
        );
        Ok(store)
    }

    /// Create a temporary store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(SledStore {
            surveys: db.open_tree("surveys")?,
            analysis_index: db.open_tree("analysis_index")?,
            responses: db.open_tree("responses")?,
            db,
            write_lock: Mutex::new(()),
            #[cfg(test)]
            fail_next_write: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Make the next multi-tree write abort after its first insert
    #[cfg(test)]
    pub(crate) fn fail_next_write(&self) {
        self.fail_next_write
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn fault_point(&self) -> TxResult<()> {
        if self
            .fail_next_write
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(abort(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "injected write failure",
            )));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn fault_point(&self) -> TxResult<()> {
        Ok(())
    }

    fn response_key(survey: &ResponseScopeId, record: &ResponseRecord) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(&survey.to_bytes());
        key.extend_from_slice(&record.id.to_bytes());
        key
    }

    fn load_survey(&self, id: &ResponseScopeId) -> Result<Option<SurveyRecord>> {
        match self.surveys.get(id.to_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }
}

impl ArtifactStore for SledStore {
    fn put_survey(&self, record: &SurveyRecord) -> Result<()> {
        let response_key = record.scopes.response.to_bytes();
        let analysis_key = record.scopes.analysis.to_bytes();
        let encoded = bincode::serialize(record)?;

        (&self.surveys, &self.analysis_index).transaction(
            |(surveys, index)| -> TxResult<()> {
                if let Some(data) = surveys.get(response_key)? {
                    let existing: SurveyRecord = bincode::deserialize(&data).map_err(abort)?;
                    if existing == *record {
                        return Ok(());
                    }
                    return Err(abort(Error::AlreadyExists(format!(
                        "survey {}",
                        record.scopes.response
                    ))));
                }
                if index.get(analysis_key)?.is_some() {
                    return Err(abort(Error::AlreadyExists(format!(
                        "analysis scope {}",
                        record.scopes.analysis
                    ))));
                }

                surveys.insert(&response_key[..], encoded.as_slice())?;
                self.fault_point()?;
                index.insert(&analysis_key[..], &response_key[..])?;
                Ok(())
            },
        )?;

        debug!("Stored survey {}", record.scopes.response);
        Ok(())
    }

    fn survey_shell(&self, id: &ResponseScopeId) -> Result<Option<SurveyShell>> {
        Ok(self.load_survey(id)?.map(|record| record.shell()))
    }

    fn survey_by_analysis(&self, id: &AnalysisScopeId) -> Result<Option<SurveyRecord>> {
        let response_key = match self.analysis_index.get(id.to_bytes())? {
            Some(key) => key,
            None => return Ok(None),
        };
        match self.surveys.get(response_key)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn append_response(&self, record: &ResponseRecord) -> Result<u64> {
        let survey_key = record.survey_id.to_bytes();
        let key = Self::response_key(&record.survey_id, record);
        let encoded = bincode::serialize(record)?;

        let count = (&self.surveys, &self.responses).transaction(
            |(surveys, responses)| -> TxResult<u64> {
                let mut survey: SurveyRecord = match surveys.get(survey_key)? {
                    Some(data) => bincode::deserialize(&data).map_err(abort)?,
                    None => {
                        return Err(abort(Error::NotFound(format!(
                            "survey {}",
                            record.survey_id
                        ))))
                    }
                };

                if let Some(existing) = responses.get(key.as_slice())? {
                    if existing.as_ref() == encoded.as_slice() {
                        return Ok(survey.response_count);
                    }
                    return Err(abort(Error::AlreadyExists(format!(
                        "response {}",
                        record.id
                    ))));
                }

                responses.insert(key.as_slice(), encoded.as_slice())?;
                self.fault_point()?;

                survey.response_count += 1;
                survey.last_response_at = Some(record.submitted_at);
                let updated = bincode::serialize(&survey).map_err(abort)?;
                surveys.insert(&survey_key[..], updated)?;
                Ok(survey.response_count)
            },
        )?;

        debug!(
            "Stored response {} for survey {} (count {})",
            record.id, record.survey_id, count
        );
        Ok(count)
    }

    fn responses(&self, survey: &ResponseScopeId) -> Result<Vec<ResponseRecord>> {
        let mut out = Vec::new();
        for entry in self.responses.scan_prefix(survey.to_bytes()) {
            let (_, data) = entry?;
            out.push(bincode::deserialize(&data)?);
        }
        Ok(out)
    }

    fn delete_survey(&self, survey: &ResponseScopeId) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let survey_key = survey.to_bytes();

        // Transactions cannot scan, so collect the child keys first
        let keys: Vec<_> = self
            .responses
            .scan_prefix(survey_key)
            .keys()
            .collect::<std::result::Result<_, _>>()?;

        let removed = (&self.surveys, &self.analysis_index, &self.responses).transaction(
            |(surveys, index, responses)| -> TxResult<usize> {
                let record: SurveyRecord = match surveys.remove(&survey_key[..])? {
                    Some(data) => bincode::deserialize(&data).map_err(abort)?,
                    None => return Ok(0),
                };
                self.fault_point()?;

                let mut removed = 1;
                for key in &keys {
                    if responses.remove(key.clone())?.is_some() {
                        removed += 1;
                    }
                }
                index.remove(&record.scopes.analysis.to_bytes()[..])?;
                Ok(removed)
            },
        )?;

        if removed > 0 {
            info!("Deleted survey {} ({} rows)", survey, removed);
        }
        Ok(removed)
    }

    fn expired_surveys(&self, now: DateTime<Utc>) -> Result<Vec<ResponseScopeId>> {
        let mut expired = Vec::new();
        for entry in self.surveys.iter() {
            let (_, data) = entry?;
            let record: SurveyRecord = bincode::deserialize(&data)?;
            if record.is_expired(now) {
                expired.push(record.scopes.response);
            }
        }
        Ok(expired)
    }
}
