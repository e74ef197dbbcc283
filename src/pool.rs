//! Bounded key derivation for async callers
//!
//! Argon2 blocks a thread and reserves its full memory cost for the whole
//! run. The pool caps concurrent runs with a semaphore, moves each run onto
//! the blocking thread pool and stops waiting after a timeout. A run that
//! outlives its caller still finishes and drops its key normally.

use crate::codec::{ArtifactCodec, EncryptedPackage};
use crate::config::{EncryptionConfig, RetentionConfig};
use crate::crypto::Fingerprint;
use crate::error::{Error, Result};
use crate::service::SurveyService;
use crate::store::ArtifactStore;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use zeroize::Zeroizing;

/// Async front for codec operations that derive keys
#[derive(Clone)]
pub struct DerivationPool {
    codec: ArtifactCodec,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl DerivationPool {
    pub fn new(codec: ArtifactCodec, max_concurrent: usize, timeout: Duration) -> Self {
        DerivationPool {
            codec,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn from_config(codec: ArtifactCodec, config: &EncryptionConfig) -> Self {
        Self::new(
            codec,
            config.max_concurrent_derivations,
            Duration::from_secs(config.derivation_timeout_secs),
        )
    }

    pub fn codec(&self) -> &ArtifactCodec {
        &self.codec
    }

    /// Derivations that may start right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Seal a value off the async executor
    pub async fn seal_artifact<T>(&self, content: T, password: Zeroizing<String>) -> Result<EncryptedPackage>
    where
        T: Serialize + Send + 'static,
    {
        self.run(move |codec| codec.seal_artifact(&content, &password))
            .await
    }

    /// Open a package off the async executor
    pub async fn open_artifact<T>(&self, pkg: EncryptedPackage, password: Zeroizing<String>) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.run(move |codec| codec.open_artifact(&pkg, &password))
            .await
    }

    /// Compute a fingerprint proof off the async executor
    pub async fn prove(&self, pkg: EncryptedPackage, password: Zeroizing<String>) -> Result<Fingerprint> {
        self.run(move |codec| codec.prove(&pkg, &password)).await
    }

    async fn run<R, F>(&self, job: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ArtifactCodec) -> Result<R> + Send + 'static,
    {
        let seconds = self.timeout.as_secs();
        let permits = Arc::clone(&self.permits);
        let codec = self.codec.clone();

        let work = async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(Error::Internal("derivation pool closed".to_string())),
            };

            let task = tokio::task::spawn_blocking(move || {
                let result = job(&codec);
                drop(permit);
                result
            });

            match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::Internal(format!("derivation task failed: {}", e))),
            }
        };

        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Derivation abandoned after {}s", seconds);
                Err(Error::Timeout { seconds })
            }
        }
    }
}

/// Periodically remove surveys whose retention has lapsed
pub fn spawn_retention_sweeper<S>(
    service: Arc<SurveyService<S>>,
    retention: &RetentionConfig,
) -> JoinHandle<()>
where
    S: ArtifactStore + 'static,
{
    let period = Duration::from_secs(retention.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let service = Arc::clone(&service);
            let outcome =
                tokio::task::spawn_blocking(move || service.sweep_expired(Utc::now())).await;
            match outcome {
                Ok(Ok(removed)) => debug!("Retention sweep finished, {} removed", removed),
                Ok(Err(e)) => error!("Retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep task panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PasswordPolicy, StorageConfig};
    use crate::crypto::{test_provider, CryptoProvider, KdfParams, OsRandom};
    use crate::access::ScopePair;
    use crate::store::{SledStore, SurveyRecord};
    use crate::survey::{Question, QuestionType, Survey};

    const PASSWORD: &str = "correct-horse-battery";

    fn pool(max: usize, timeout: Duration) -> DerivationPool {
        let codec = ArtifactCodec::new(test_provider(), PasswordPolicy::default());
        DerivationPool::new(codec, max, timeout)
    }

    fn survey() -> Survey {
        Survey {
            title: "Pool".to_string(),
            description: String::new(),
            questions: vec![Question {
                id: "q1".to_string(),
                kind: QuestionType::Text,
                text: "Anything?".to_string(),
            }],
        }
    }

    fn password(s: &str) -> Zeroizing<String> {
        Zeroizing::new(s.to_string())
    }

    #[tokio::test]
    async fn test_seal_and_open_async() {
        let pool = pool(2, Duration::from_secs(30));
        let pkg = pool.seal_artifact(survey(), password(PASSWORD)).await.unwrap();
        let opened: Survey = pool.open_artifact(pkg.clone(), password(PASSWORD)).await.unwrap();
        assert_eq!(opened, survey());

        let proof = pool.prove(pkg.clone(), password(PASSWORD)).await.unwrap();
        assert_eq!(proof, pkg.fingerprint);
    }

    #[tokio::test]
    async fn test_wrong_password_async() {
        let pool = pool(1, Duration::from_secs(30));
        let pkg = pool.seal_artifact(survey(), password(PASSWORD)).await.unwrap();
        let result = pool
            .open_artifact::<Survey>(pkg, password("wrong-password"))
            .await;
        assert!(matches!(result, Err(Error::WrongPassword)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_calls_share_permits() {
        let pool = pool(2, Duration::from_secs(60));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.seal_artifact(survey(), password(PASSWORD)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_timeout() {
        // Heavy enough to outlast a 1ms deadline
        let provider = Arc::new(
            CryptoProvider::new(
                Arc::new(OsRandom),
                KdfParams {
                    memory_kib: 16 * 1024,
                    iterations: 2,
                    parallelism: 1,
                },
            )
            .unwrap(),
        );
        let codec = ArtifactCodec::new(provider, PasswordPolicy::default());
        let pool = DerivationPool::new(codec, 1, Duration::from_millis(1));

        let result = pool.seal_artifact(survey(), password(PASSWORD)).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired() {
        let codec = ArtifactCodec::new(test_provider(), PasswordPolicy::default());
        let retention = RetentionConfig {
            max_age_days: 1,
            sweep_interval_secs: 1,
        };
        let service = Arc::new(SurveyService::new(
            Arc::new(SledStore::in_memory().unwrap()),
            codec.ids().clone(),
            retention.clone(),
            StorageConfig::default(),
        ));

        let live = service
            .create_survey(codec.seal_artifact(&survey(), PASSWORD).unwrap())
            .unwrap();
        let lapsed = SurveyRecord {
            scopes: ScopePair::mint(codec.ids()),
            package: codec.seal_artifact(&survey(), PASSWORD).unwrap(),
            response_count: 0,
            last_response_at: None,
            expires_at: Utc::now() - chrono::Duration::hours(1),
        };
        service.store().put_survey(&lapsed).unwrap();

        let handle = spawn_retention_sweeper(Arc::clone(&service), &retention);
        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.abort();

        assert!(service
            .store()
            .survey_by_analysis(&lapsed.scopes.analysis)
            .unwrap()
            .is_none());
        assert!(service
            .store()
            .survey_by_analysis(&live.analysis_id)
            .unwrap()
            .is_some());
    }
}
