//! Party-scoped reads of the active-state view.

use std::collections::BTreeSet;
use stl_schemas::{Contract, Offset, Party, TemplateId};
use tracing::debug;

use crate::api::{InclusiveFilter, QueryRequest};
use crate::envelope;
use crate::session::{Call, LedgerSession};
use crate::template::TemplateResolver;
use crate::LedgerError;

/// Holding payload fields read by [`ActiveStateQuery::holdings`].
pub const HOLDING_OWNER_FIELD: &str = "owner";
pub const HOLDING_CURRENCY_FIELD: &str = "currency";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySelector {
    RecordType(TemplateId),
    ContractIds(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ActiveStateQuery {
    session: LedgerSession,
    templates: TemplateResolver,
}

impl ActiveStateQuery {
    pub fn new(session: LedgerSession, templates: TemplateResolver) -> Self {
        Self { session, templates }
    }

    /// Active contracts visible to `party` at `at` (`Offset::frontier()` for
    /// the current head).
    ///
    /// A `403` means "not visible to this party" and yields an empty result.
    /// A `401` that survives one token refresh is returned as `Auth`.
    pub async fn query(
        &self,
        selector: &QuerySelector,
        party: &Party,
        at: &Offset,
    ) -> Result<Vec<Contract>, LedgerError> {
        let inclusive = match selector {
            QuerySelector::RecordType(t) => InclusiveFilter {
                record_type_ids: vec![self.templates.qualify(t).await?],
                contract_ids: vec![],
            },
            QuerySelector::ContractIds(ids) if ids.is_empty() => return Ok(vec![]),
            QuerySelector::ContractIds(ids) => InclusiveFilter {
                record_type_ids: vec![],
                contract_ids: ids.clone(),
            },
        };

        let req = QueryRequest::for_party(party, at, inclusive);
        let body = match self.session.execute(Call::Query(&req)).await {
            Ok(body) => body,
            Err(LedgerError::Permission { message }) => {
                debug!(party = %party, selector = ?selector, %message, "not visible to party; empty result");
                return Ok(vec![]);
            }
            Err(e) => return Err(e),
        };

        let mut contracts = envelope::normalize(&body)?;

        // Ledgers that ignore part of the filter must not leak other records.
        match selector {
            QuerySelector::RecordType(t) => contracts.retain(|c| c.record_type.same_type(t)),
            QuerySelector::ContractIds(ids) => {
                let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
                contracts.retain(|c| wanted.contains(c.id.as_str()));
            }
        }

        debug!(party = %party, at = %at, count = contracts.len(), "active-state query");
        Ok(contracts)
    }

    /// `party`'s own holdings of `currency`, at the frontier.
    pub async fn holdings(
        &self,
        party: &Party,
        holding_type: &TemplateId,
        currency: &str,
    ) -> Result<Vec<Contract>, LedgerError> {
        let all = self
            .query(
                &QuerySelector::RecordType(holding_type.clone()),
                party,
                &Offset::frontier(),
            )
            .await?;
        Ok(all
            .into_iter()
            .filter(|c| c.field_str(HOLDING_OWNER_FIELD) == Some(party.as_str()))
            .filter(|c| c.field_str(HOLDING_CURRENCY_FIELD) == Some(currency))
            .collect())
    }
}
