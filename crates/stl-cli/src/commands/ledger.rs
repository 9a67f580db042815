//! Read-side commands: identity, template qualification, active state.

use anyhow::{Context, Result};
use serde_json::json;
use stl_ledger::QuerySelector;
use stl_schemas::{Offset, Party, TemplateId};

use super::{print_json, Client};

/// Offline: validates the configured party and prints its parts.
pub fn party(party: &Party) -> Result<()> {
    println!("party={}", party);
    println!("prefix={}", party.prefix());
    println!("fingerprint={}", party.fingerprint());
    Ok(())
}

pub async fn qualify(client: &Client, raw: &str) -> Result<()> {
    let template = TemplateId::parse(raw).with_context(|| format!("invalid template id: {raw}"))?;
    let qualified = client.templates.qualify(&template).await?;
    if !qualified.is_qualified() {
        anyhow::bail!("PACKAGE_UNKNOWN: could not discover a package id for {template}");
    }
    println!("{}", qualified);
    Ok(())
}

pub async fn query(
    client: &Client,
    template: Option<&str>,
    contract_ids: Vec<String>,
    offset: Option<&str>,
) -> Result<()> {
    let party = client.cfg.party()?;
    let selector = match template {
        Some(raw) => QuerySelector::RecordType(
            TemplateId::parse(raw).with_context(|| format!("invalid template id: {raw}"))?,
        ),
        None if !contract_ids.is_empty() => QuerySelector::ContractIds(contract_ids),
        None => anyhow::bail!("query needs --template or at least one --contract-id"),
    };
    let at = offset.map(Offset::new).unwrap_or_else(Offset::frontier);

    let contracts = client.query.query(&selector, party, &at).await?;
    tracing::info!(count = contracts.len(), at = %at, "active contracts");
    print_json(&contracts)
}

pub async fn holdings(client: &Client, currency: &str) -> Result<()> {
    let party = client.cfg.party()?;
    let holdings = client
        .query
        .holdings(party, &client.cfg.templates.holding, currency)
        .await?;
    let total: i64 = holdings
        .iter()
        .filter_map(|h| h.field_micros(stl_execution::HOLDING_AMOUNT_FIELD))
        .sum();
    print_json(&json!({
        "party": party.as_str(),
        "currency": currency,
        "total": stl_schemas::micros_to_amount(total),
        "holdings": holdings,
    }))
}
