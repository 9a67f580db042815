use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{Offset, TemplateId};

/// A single-use ledger write intent. Never persisted.
///
/// Serializes to the submit endpoint's externally tagged shape:
/// `{"Create": {...}}` or `{"Exercise": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Create {
        #[serde(rename = "recordType")]
        record_type: TemplateId,
        payload: Map<String, Value>,
    },
    Exercise {
        #[serde(rename = "contractId")]
        contract_id: String,
        #[serde(rename = "recordType")]
        record_type: TemplateId,
        choice: String,
        argument: Value,
    },
}

impl Command {
    pub fn create(record_type: TemplateId, payload: Map<String, Value>) -> Self {
        Command::Create {
            record_type,
            payload,
        }
    }

    pub fn exercise(
        contract_id: impl Into<String>,
        record_type: TemplateId,
        choice: impl Into<String>,
        argument: Value,
    ) -> Self {
        Command::Exercise {
            contract_id: contract_id.into(),
            record_type,
            choice: choice.into(),
            argument,
        }
    }

    pub fn record_type(&self) -> &TemplateId {
        match self {
            Command::Create { record_type, .. } | Command::Exercise { record_type, .. } => {
                record_type
            }
        }
    }

    /// Copy of this command pointed at a different record type.
    pub fn with_record_type(&self, record_type: TemplateId) -> Self {
        let mut out = self.clone();
        match &mut out {
            Command::Create { record_type: r, .. } | Command::Exercise { record_type: r, .. } => {
                *r = record_type
            }
        }
        out
    }

    /// Choice name for exercises, `None` for creates.
    pub fn choice(&self) -> Option<&str> {
        match self {
            Command::Create { .. } => None,
            Command::Exercise { choice, .. } => Some(choice),
        }
    }
}

/// Caller-supplied idempotency key for one submission.
///
/// A submission retried after a network-level failure MUST carry the same
/// `CommandId` so the ledger deduplicates a write that actually landed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of commit. Says nothing about the identity of created contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub update_id: String,
    pub completion_offset: Offset,
}
