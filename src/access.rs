//! Access scopes
//!
//! Every survey gets two unrelated identifiers:
//! - response scope: shared with respondents, opens the survey shell and
//!   accepts submissions
//! - analysis scope: kept by the creator, reaches the creator-only
//!   operations when paired with a matching fingerprint
//!
//! The two are distinct types so one cannot be passed where the other is
//! expected, and they are drawn independently so neither reveals the other.

use crate::crypto::Fingerprint;
use crate::error::{Error, Result};
use crate::id::{Identifier, IdentifierGenerator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Identifier handed to respondents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseScopeId(Identifier);

/// Identifier kept by the survey creator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisScopeId(Identifier);

macro_rules! scope_id_impls {
    ($name:ident) => {
        impl $name {
            pub fn identifier(&self) -> Identifier {
                self.0
            }

            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Ok($name(Identifier::parse(s)?))
            }
        }
    };
}

scope_id_impls!(ResponseScopeId);
scope_id_impls!(AnalysisScopeId);

/// The identifier pair minted for one survey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopePair {
    pub response: ResponseScopeId,
    pub analysis: AnalysisScopeId,
}

impl ScopePair {
    /// Mint two independent identifiers
    pub fn mint(ids: &IdentifierGenerator) -> Self {
        ScopePair {
            response: ResponseScopeId(ids.generate()),
            analysis: AnalysisScopeId(ids.generate()),
        }
    }
}

/// Gate for creator-only operations.
///
/// The caller has already resolved the record through its analysis-scope
/// id; this checks the supplied proof against the stored fingerprint in
/// constant time.
pub fn authorize_analysis(
    analysis_id: &AnalysisScopeId,
    stored: &Fingerprint,
    supplied: &Fingerprint,
) -> Result<()> {
    if bool::from(stored.ct_eq(supplied)) {
        Ok(())
    } else {
        warn!("Rejected fingerprint proof for analysis scope {}", analysis_id);
        Err(Error::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::FINGERPRINT_SIZE;

    #[test]
    fn test_pair_ids_are_unrelated() {
        let ids = IdentifierGenerator::default();
        let pair = ScopePair::mint(&ids);

        let response = pair.response.to_string();
        let analysis = pair.analysis.to_string();
        assert_ne!(response, analysis);

        // Only the timestamp prefix may coincide
        assert_ne!(response[10..], analysis[10..]);
        let shared_suffix = response
            .bytes()
            .rev()
            .zip(analysis.bytes().rev())
            .take_while(|(a, b)| a == b)
            .count();
        assert!(shared_suffix < 6);
    }

    #[test]
    fn test_scope_ids_parse() {
        let pair = ScopePair::mint(&IdentifierGenerator::default());
        let parsed: AnalysisScopeId = pair.analysis.to_string().parse().unwrap();
        assert_eq!(parsed, pair.analysis);
        assert!("not-an-id".parse::<ResponseScopeId>().is_err());
    }

    #[test]
    fn test_scope_pair_json() {
        let pair = ScopePair::mint(&IdentifierGenerator::default());
        let value = serde_json::to_value(pair).unwrap();
        assert_eq!(value["response"], pair.response.to_string());
        assert_eq!(value["analysis"], pair.analysis.to_string());
    }

    #[test]
    fn test_authorize_analysis() {
        let pair = ScopePair::mint(&IdentifierGenerator::default());
        let stored = Fingerprint::from_bytes([7u8; FINGERPRINT_SIZE]);
        let mut other = [7u8; FINGERPRINT_SIZE];
        other[FINGERPRINT_SIZE - 1] = 8;

        assert!(authorize_analysis(&pair.analysis, &stored, &stored).is_ok());
        assert!(matches!(
            authorize_analysis(&pair.analysis, &stored, &Fingerprint::from_bytes(other)),
            Err(Error::Unauthorized)
        ));
    }
}
