//! Transport boundary for the ledger's JSON API.
//!
//! [`LedgerApi`] is the only seam between this crate's clients and the
//! network. It moves raw JSON; normalizing response shapes and deciding
//! what to retry belong to the clients on top. The live implementation is
//! [`crate::HttpLedger`]; tests plug in an in-memory ledger.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use stl_schemas::{Command, CommandId, Offset, Party, TemplateId};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Wire requests
// ---------------------------------------------------------------------------

/// Body of the submit-and-wait endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub commands: Vec<Command>,
    pub command_id: CommandId,
    pub act_as: Vec<Party>,
}

/// Body of the active-state query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub read_as: Vec<Party>,
    pub active_at_offset: Offset,
    pub verbose: bool,
    pub filter: QueryFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub filters_by_party: BTreeMap<Party, PartyFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyFilter {
    pub inclusive: InclusiveFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusiveFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_type_ids: Vec<TemplateId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contract_ids: Vec<String>,
}

impl QueryRequest {
    /// A filter scoped to exactly one reading party. There is deliberately
    /// no constructor for an any-party filter.
    pub fn for_party(party: &Party, at: &Offset, inclusive: InclusiveFilter) -> Self {
        let mut filters_by_party = BTreeMap::new();
        filters_by_party.insert(party.clone(), PartyFilter { inclusive });
        Self {
            read_as: vec![party.clone()],
            active_at_offset: at.clone(),
            verbose: true,
            filter: QueryFilter { filters_by_party },
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerApi
// ---------------------------------------------------------------------------

/// Raw ledger endpoints. Implementations map HTTP status to [`LedgerError`]
/// (401 → `Auth`, 403 → `Permission`, 502/503/504 and network failures →
/// `Transport`, other non-2xx → `Rejection`) and perform no retries.
#[async_trait::async_trait]
pub trait LedgerApi: Send + Sync {
    async fn submit_and_wait(&self, token: &str, req: &SubmitRequest) -> Result<Value, LedgerError>;

    async fn active_contracts(&self, token: &str, req: &QueryRequest)
        -> Result<Value, LedgerError>;

    async fn list_packages(&self, token: &str) -> Result<Value, LedgerError>;
}

// ---------------------------------------------------------------------------
// TokenSource
// ---------------------------------------------------------------------------

/// Credential collaborator. Owning refresh (OAuth etc.) is out of scope for
/// this crate; it only asks for a valid token and, after a 401, a fresh one.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, LedgerError>;

    /// Force a refresh. Called at most once per operation, after an `Auth` error.
    async fn refresh(&self) -> Result<String, LedgerError>;
}

/// Fixed token resolved from configuration. Refresh returns the same value,
/// so a rejected static token surfaces as `Auth` after one retry.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, LedgerError> {
        if self.token.is_empty() {
            return Err(LedgerError::Auth {
                message: "no ledger token configured".to_string(),
            });
        }
        Ok(self.token.clone())
    }

    async fn refresh(&self) -> Result<String, LedgerError> {
        self.token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_request_serializes_party_scoped_filter() {
        let party = Party::parse("alice::1220aa").unwrap();
        let req = QueryRequest::for_party(
            &party,
            &Offset::frontier(),
            InclusiveFilter {
                record_type_ids: vec![TemplateId::parse("pkg:Token:Holding").unwrap()],
                contract_ids: vec![],
            },
        );
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "readAs": ["alice::1220aa"],
                "activeAtOffset": "0",
                "verbose": true,
                "filter": {"filtersByParty": {"alice::1220aa": {
                    "inclusive": {"recordTypeIds": ["pkg:Token:Holding"]}
                }}}
            })
        );
    }

    #[tokio::test]
    async fn empty_static_token_is_an_auth_error() {
        let t = StaticToken::new("");
        assert!(t.token().await.unwrap_err().is_auth());
    }

    #[test]
    fn static_token_debug_is_redacted() {
        let t = StaticToken::new("secret-value");
        assert!(!format!("{t:?}").contains("secret-value"));
    }
}
