//! Configuration management for sealpoll

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default Argon2 memory cost: 256 MiB
pub const DEFAULT_ARGON2_MEMORY_KIB: u32 = 256 * 1024;

/// Default Argon2 time cost
pub const DEFAULT_ARGON2_ITERATIONS: u32 = 3;

/// Default Argon2 lanes
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 1;

/// Default minimum password length (characters)
pub const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;

/// Default maximum password length (characters)
pub const DEFAULT_PASSWORD_MAX_LENGTH: usize = 128;

/// Default artifact retention: 30 days
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Longest retention a config may ask for (100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Default retention sweep interval: 1 hour
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Encryption configuration
    pub encryption: EncryptionConfig,

    /// Password strength policy
    #[serde(default)]
    pub password: PasswordPolicy,

    /// Retention configuration
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to the data directory
    pub data_dir: PathBuf,
}

/// Encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,

    /// Upper bound on derivations running at once
    #[serde(default = "default_max_concurrent_derivations")]
    pub max_concurrent_derivations: usize,

    /// Seconds a caller waits for a derivation before giving up
    #[serde(default = "default_derivation_timeout")]
    pub derivation_timeout_secs: u64,
}

fn default_max_concurrent_derivations() -> usize {
    4
}

fn default_derivation_timeout() -> u64 {
    30
}

/// Password length bounds
///
/// The ceiling bounds derivation cost; the floor rejects trivially
/// guessable passwords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,

    /// Maximum length in characters
    pub max_length: usize,
}

/// Retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Surveys older than this many days are removed by the sweeper
    pub max_age_days: u32,

    /// Seconds between background sweeps
    pub sweep_interval_secs: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Retry attempts for transient storage failures
    pub retry_attempts: u32,

    /// Base delay for exponential backoff (ms)
    pub retry_base_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sealpoll");

        Config {
            encryption: EncryptionConfig::default(),
            password: PasswordPolicy::default(),
            retention: RetentionConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            data_dir,
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            argon2_memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            argon2_iterations: DEFAULT_ARGON2_ITERATIONS,
            argon2_parallelism: DEFAULT_ARGON2_PARALLELISM,
            max_concurrent_derivations: default_max_concurrent_derivations(),
            derivation_timeout_secs: default_derivation_timeout(),
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        PasswordPolicy {
            min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            max_length: DEFAULT_PASSWORD_MAX_LENGTH,
        }
    }
}

impl PasswordPolicy {
    /// Check a password against the length bounds
    pub fn check(&self, password: &str) -> Result<()> {
        let len = password.chars().count();
        if len < self.min_length {
            return Err(Error::WeakPassword(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        if len > self.max_length {
            return Err(Error::WeakPassword(format!(
                "password must be at most {} characters",
                self.max_length
            )));
        }
        Ok(())
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            max_age_days: DEFAULT_RETENTION_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RetentionConfig {
    /// Maximum artifact age as a chrono duration
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_age_days))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            retry_attempts: 3,
            retry_base_delay_ms: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SEALPOLL_DATA_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }

        if let Ok(memory) = std::env::var("SEALPOLL_ARGON2_MEMORY_KIB") {
            if let Ok(kib) = memory.trim().parse::<u32>() {
                self.encryption.argon2_memory_kib = kib;
            }
        }

        if let Ok(iterations) = std::env::var("SEALPOLL_ARGON2_ITERATIONS") {
            if let Ok(n) = iterations.trim().parse::<u32>() {
                self.encryption.argon2_iterations = n;
            }
        }

        if let Ok(level) = std::env::var("SEALPOLL_LOG_LEVEL") {
            let level = level.trim().to_string();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }

        if let Ok(days) = std::env::var("SEALPOLL_RETENTION_DAYS") {
            if let Ok(days) = days.trim().parse::<u32>() {
                self.retention.max_age_days = days;
            }
        }
    }

    /// Create a new config from defaults and environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let enc = &self.encryption;

        if enc.argon2_iterations == 0 {
            return Err(Error::InvalidConfig(
                "Argon2 iterations must be at least 1".to_string(),
            ));
        }

        if enc.argon2_parallelism == 0 {
            return Err(Error::InvalidConfig(
                "Argon2 parallelism must be at least 1".to_string(),
            ));
        }

        let min_memory = u64::from(enc.argon2_parallelism) * 8;
        if u64::from(enc.argon2_memory_kib) < min_memory {
            return Err(Error::InvalidConfig(format!(
                "Argon2 memory must be at least {} KiB for parallelism {}",
                min_memory, enc.argon2_parallelism
            )));
        }

        if enc.max_concurrent_derivations == 0 {
            return Err(Error::InvalidConfig(
                "At least one concurrent derivation must be allowed".to_string(),
            ));
        }

        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            return Err(Error::InvalidConfig(format!(
                "Password bounds are inconsistent: min {} max {}",
                self.password.min_length, self.password.max_length
            )));
        }

        if self.retention.max_age_days == 0 {
            return Err(Error::InvalidConfig(
                "Retention must be at least one day".to_string(),
            ));
        }

        if self.retention.max_age_days > MAX_RETENTION_DAYS {
            return Err(Error::InvalidConfig(format!(
                "Retention of {} days exceeds the limit of {}",
                self.retention.max_age_days, MAX_RETENTION_DAYS
            )));
        }

        Ok(())
    }

    /// Path of the sled database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("artifacts.db")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.encryption.argon2_memory_kib, 262_144);
        assert_eq!(config.encryption.argon2_iterations, 3);
        assert_eq!(config.encryption.argon2_parallelism, 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.data_dir = dir.path().join("data");
        config.retention.max_age_days = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retention.max_age_days, 7);
        assert_eq!(loaded.data_dir, dir.path().join("data"));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "encryption": {
                    "argon2_memory_kib": 1024,
                    "argon2_iterations": 1,
                    "argon2_parallelism": 1
                },
                "data_dir": "/tmp/sealpoll"
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.encryption.max_concurrent_derivations, 4);
        assert_eq!(config.password.min_length, DEFAULT_PASSWORD_MIN_LENGTH);
        assert_eq!(config.storage.retry_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = Config::default();
        config.encryption.argon2_iterations = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_tiny_memory() {
        let mut config = Config::default();
        config.encryption.argon2_parallelism = 4;
        config.encryption.argon2_memory_kib = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_huge_parallelism_does_not_overflow() {
        let mut config = Config::default();
        config.encryption.argon2_parallelism = u32::MAX;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_retention() {
        let mut config = Config::default();
        config.retention.max_age_days = u32::MAX;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.retention.max_age_days = MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_password_bounds() {
        let mut config = Config::default();
        config.password.min_length = 64;
        config.password.max_length = 32;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_policy_bounds() {
        let policy = PasswordPolicy::default();
        assert!(matches!(policy.check("short"), Err(Error::WeakPassword(_))));
        assert!(policy.check("correct-horse-battery").is_ok());
        assert!(policy.check(&"x".repeat(129)).is_err());
        assert!(policy.check(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn test_password_policy_counts_characters() {
        let policy = PasswordPolicy::default();
        // 8 characters, 16 bytes
        assert!(policy.check("éééééééé").is_ok());
    }
}
