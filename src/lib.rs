//! sealpoll - Zero-knowledge encrypted surveys
//!
//! A creator seals a questionnaire under a password; the server stores
//! only ciphertext, a salt and a key fingerprint. Respondents holding the
//! password seal their answers the same way. Creator-only operations need
//! both the analysis-scope identifier and a fingerprint proof that only the
//! password can produce.

pub mod access;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod pool;
pub mod service;
pub mod store;
pub mod survey;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::access::{AnalysisScopeId, ResponseScopeId, ScopePair};
    pub use crate::codec::{ArtifactCodec, EncryptedPackage};
    pub use crate::config::Config;
    pub use crate::crypto::{CryptoProvider, Fingerprint};
    pub use crate::error::{Error, Result};
    pub use crate::id::{Identifier, IdentifierGenerator};
    pub use crate::survey::{AnswerValue, ResponseBody, Survey};
}
