//! Settlement commands: place, cancel, release.
//!
//! Failures that may leave funds locked are reported with the contract ids
//! an operator needs and exit with [`EXIT_FUNDS_LOCKED`].

use anyhow::Result;
use serde_json::json;
use stl_execution::{OrderRequest, SettlementError, Side};

use super::{print_json, Client};

pub const EXIT_FUNDS_LOCKED: i32 = 2;

/// Error carrying a distinct process exit code.
#[derive(Debug)]
pub struct SettlementFailure(pub SettlementError);

impl std::fmt::Display for SettlementFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SettlementFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl SettlementFailure {
    pub fn exit_code(&self) -> i32 {
        if self.0.funds_locked() {
            EXIT_FUNDS_LOCKED
        } else {
            1
        }
    }
}

pub struct PlaceArgs {
    pub currency: String,
    pub amount: String,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub instrument: String,
}

pub async fn place(client: &Client, args: PlaceArgs) -> Result<()> {
    let party = client.cfg.party()?.clone();
    let side: Side = args.side.parse().map_err(anyhow::Error::msg)?;
    let coordinator = client.coordinator()?;

    let placed = coordinator
        .place_order(OrderRequest {
            party,
            currency: args.currency,
            amount: args.amount,
            side,
            price: args.price,
            quantity: args.quantity,
            instrument: args.instrument,
        })
        .await
        .map_err(SettlementFailure)?;

    print_json(&json!({
        "order_id": placed.order_id,
        "state": placed.run.state.label(),
        "allocation_cid": placed.allocation.id,
        "order_cid": placed.order.id,
    }))
}

pub async fn cancel(client: &Client, order_cid: &str) -> Result<()> {
    let party = client.cfg.party()?;
    let coordinator = client.coordinator()?;
    let Some(order) = coordinator.find_order(party, order_cid).await? else {
        anyhow::bail!("ORDER_NOT_FOUND: {order_cid} is not active for {party}");
    };
    let res = coordinator
        .cancel_order(party, &order)
        .await
        .map_err(SettlementFailure)?;
    print_json(&json!({
        "order_cid": order.id,
        "update_id": res.update_id,
        "completion_offset": res.completion_offset,
    }))
}

pub async fn release(client: &Client, allocation_cid: &str) -> Result<()> {
    let party = client.cfg.party()?;
    let coordinator = client.coordinator()?;
    let res = coordinator
        .release_allocation(party, allocation_cid)
        .await
        .map_err(SettlementFailure)?;
    print_json(&json!({
        "allocation_cid": allocation_cid,
        "update_id": res.update_id,
        "completion_offset": res.completion_offset,
    }))
}
