//! Party identities.
//!
//! A party is issued by the ledger as `<prefix>::<fingerprint>`. The
//! fingerprint half is derived from the party's public key; signing
//! workflows need it back, which is plain string parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyError {
    MissingSeparator(String),
    EmptyPrefix(String),
    EmptyFingerprint(String),
    /// Fingerprint is not valid hex (only raised by [`Party::fingerprint_bytes`]).
    FingerprintNotHex(String),
}

impl fmt::Display for PartyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyError::MissingSeparator(p) => {
                write!(f, "party '{p}' is not of the form <prefix>::<fingerprint>")
            }
            PartyError::EmptyPrefix(p) => write!(f, "party '{p}' has an empty prefix"),
            PartyError::EmptyFingerprint(p) => write!(f, "party '{p}' has an empty fingerprint"),
            PartyError::FingerprintNotHex(p) => write!(f, "party '{p}' fingerprint is not hex"),
        }
    }
}

impl std::error::Error for PartyError {}

/// A validated ledger party. Immutable once allocated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Party {
    raw: String,
    split_at: usize,
}

impl Party {
    pub fn parse(raw: &str) -> Result<Self, PartyError> {
        let raw = raw.trim();
        let split_at = raw
            .find(SEPARATOR)
            .ok_or_else(|| PartyError::MissingSeparator(raw.to_string()))?;
        if split_at == 0 {
            return Err(PartyError::EmptyPrefix(raw.to_string()));
        }
        if raw.len() == split_at + SEPARATOR.len() {
            return Err(PartyError::EmptyFingerprint(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            split_at,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Human-chosen hint before the separator.
    pub fn prefix(&self) -> &str {
        &self.raw[..self.split_at]
    }

    /// Key-derived namespace after the separator.
    pub fn fingerprint(&self) -> &str {
        &self.raw[self.split_at + SEPARATOR.len()..]
    }

    /// Fingerprint decoded from hex, for handing to a signer.
    pub fn fingerprint_bytes(&self) -> Result<Vec<u8>, PartyError> {
        hex::decode(self.fingerprint()).map_err(|_| PartyError::FingerprintNotHex(self.raw.clone()))
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Party {
    type Error = PartyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Party::parse(&value)
    }
}

impl From<Party> for String {
    fn from(p: Party) -> Self {
        p.raw
    }
}

impl std::str::FromStr for Party {
    type Err = PartyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Party::parse(s)
    }
}
