//! Time-ordered artifact identifiers
//!
//! 128-bit values: a 48-bit Unix millisecond timestamp followed by 80
//! random bits, written as 26 Crockford base-32 characters. Identifiers
//! sort lexically by creation time. Uniqueness comes from the random part
//! alone, no storage lookup is involved.

use crate::crypto::{OsRandom, RandomSource};
use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Encoded identifier length
pub const ID_LENGTH: usize = 26;

/// Crockford base-32 alphabet (no I, L, O, U)
pub const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Bytes of randomness per identifier (80 bits)
const RANDOM_BYTES: usize = 10;

/// Largest timestamp that fits in 48 bits
const MAX_TIMESTAMP_MS: u64 = (1 << 48) - 1;

/// Globally unique, time-sortable identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(u128);

impl Identifier {
    /// Build from a timestamp and 80 random bits
    fn from_parts(timestamp_ms: u64, random: [u8; RANDOM_BYTES]) -> Self {
        let mut value = u128::from(timestamp_ms & MAX_TIMESTAMP_MS) << 80;
        for (i, byte) in random.iter().enumerate() {
            value |= u128::from(*byte) << (8 * (RANDOM_BYTES - 1 - i));
        }
        Identifier(value)
    }

    /// Creation time in Unix milliseconds
    pub fn timestamp_ms(&self) -> u64 {
        (self.0 >> 80) as u64
    }

    /// Creation time
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms() as i64).single()
    }

    /// Raw 128-bit value, big-endian
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Encode as 26 Crockford characters
    pub fn encode(&self) -> String {
        let mut out = [0u8; ID_LENGTH];
        let mut value = self.0;
        for slot in out.iter_mut().rev() {
            *slot = ALPHABET[(value & 0x1F) as usize];
            value >>= 5;
        }
        // Only ASCII from ALPHABET is written
        out.iter().map(|&b| b as char).collect()
    }

    /// Parse a 26-character identifier, accepting lower case
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != ID_LENGTH {
            return Err(Error::InvalidIdentifier(format!(
                "expected {} characters, got {}",
                ID_LENGTH,
                s.len()
            )));
        }

        let mut value: u128 = 0;
        for (pos, c) in s.bytes().enumerate() {
            let digit = decode_symbol(c).ok_or_else(|| {
                Error::InvalidIdentifier(format!("invalid character at position {}", pos))
            })?;
            // 26 * 5 = 130 bits, so the leading symbol may carry at most 3
            if pos == 0 && digit > 7 {
                return Err(Error::InvalidIdentifier(
                    "value exceeds 128 bits".to_string(),
                ));
            }
            value = (value << 5) | u128::from(digit);
        }

        Ok(Identifier(value))
    }
}

fn decode_symbol(c: u8) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    ALPHABET.iter().position(|&a| a == upper).map(|p| p as u8)
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.encode())
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Identifier::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Mints identifiers from a clock and a random source
#[derive(Clone)]
pub struct IdentifierGenerator {
    random: Arc<dyn RandomSource>,
}

impl IdentifierGenerator {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        IdentifierGenerator { random }
    }

    /// Generate an identifier stamped with the current time
    pub fn generate(&self) -> Identifier {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.generate_at(now)
    }

    /// Generate an identifier stamped with the given time.
    ///
    /// Each call draws fresh randomness; two ids in the same millisecond
    /// are independent rather than incremented from one another.
    pub fn generate_at(&self, timestamp_ms: u64) -> Identifier {
        let mut random = [0u8; RANDOM_BYTES];
        self.random.fill_bytes(&mut random);
        Identifier::from_parts(timestamp_ms, random)
    }
}

impl Default for IdentifierGenerator {
    fn default() -> Self {
        Self::new(Arc::new(OsRandom))
    }
}
