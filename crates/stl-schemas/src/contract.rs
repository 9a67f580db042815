use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::{amount_to_micros, Party, TemplateId};

// ---------------------------------------------------------------------------
// Offset
// ---------------------------------------------------------------------------

/// Ledger-assigned position in the commit history.
///
/// Opaque on the wire (the ledger has sent both JSON strings and numbers);
/// `"0"` denotes the current frontier in queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Offset(String);

impl Offset {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Query at whatever the ledger currently considers its head.
    pub fn frontier() -> Self {
        Self("0".to_string())
    }

    pub fn is_frontier(&self) -> bool {
        self.0 == "0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value when the ledger uses integer offsets.
    pub fn ordinal(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Offset(s),
            Raw::Number(n) => Offset(n.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// A created, active ledger record in flat form.
///
/// Immutable: the ledger archives and supersedes, it never mutates. Field
/// aliases cover the naming the query endpoint has used historically
/// (`templateId`, `createArgument`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(rename = "contractId")]
    pub id: String,
    #[serde(rename = "recordType", alias = "templateId")]
    pub record_type: TemplateId,
    #[serde(default, alias = "createArgument", alias = "createArguments")]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub signatories: BTreeSet<Party>,
    #[serde(default)]
    pub observers: BTreeSet<Party>,
    #[serde(default, alias = "createdOffset", skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

impl Contract {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    /// A decimal field (string or JSON number) as integer micros.
    pub fn field_micros(&self, name: &str) -> Option<i64> {
        match self.payload.get(name)? {
            Value::String(s) => amount_to_micros(s).ok(),
            Value::Number(n) => amount_to_micros(&n.to_string()).ok(),
            _ => None,
        }
    }
}
