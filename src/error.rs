//! Error types for sealpoll

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sealpoll
#[derive(Error, Debug)]
pub enum Error {
    // Crypto errors
    #[error("Password rejected: {0}")]
    WeakPassword(String),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Incorrect password")]
    WrongPassword,

    #[error("Authentication failed")]
    Authentication,

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Corrupted data in artifact {artifact_id}")]
    CorruptedData { artifact_id: String },

    #[error("Malformed content: {0}")]
    MalformedContent(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    // Identifier errors
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // Survey errors
    #[error("Invalid survey: {}", .0.join("; "))]
    InvalidSurvey(Vec<String>),

    #[error("Invalid response: {}", .0.join("; "))]
    InvalidResponse(Vec<String>),

    // Access errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same storage call may succeed.
    ///
    /// Cryptographic failures are deterministic and never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            Error::Database(sled::Error::Io(_)) => true,
            _ => false,
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Wrong password, tamper and wrong-key failures collapse into the same
    /// text so the serving layer never becomes a decryption oracle.
    pub fn user_message(&self) -> String {
        match self {
            Error::WeakPassword(reason) => reason.clone(),
            Error::WrongPassword | Error::Authentication | Error::CorruptedData { .. } => {
                "incorrect password or damaged data".to_string()
            }
            Error::MalformedContent(_) => {
                "the artifact opened but its contents are not in a supported format".to_string()
            }
            Error::InvalidSurvey(_) | Error::InvalidResponse(_) => self.to_string(),
            Error::NotFound(_) => "not found".to_string(),
            Error::Unauthorized => "not authorized".to_string(),
            Error::Timeout { .. } => "the server is busy, try again".to_string(),
            _ => "internal error".to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<sled::transaction::TransactionError<Error>> for Error {
    fn from(e: sled::transaction::TransactionError<Error>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(inner) => Error::Database(inner),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
