//! Scenario: lock 100 USDT, confirm the Allocation, place an order against
//! it, confirm the Order by its client order id.
//!
//! The confirmed Order must reference the Allocation resolved in Phase A.

use stl_execution::{
    holdings_channel, orders_channel, OrderRequest, RefreshReason, SettlementState, Side,
};
use stl_testkit::{alice, SettlementHarness};

fn order(amount: &str) -> OrderRequest {
    OrderRequest {
        party: alice(),
        currency: "USDT".to_string(),
        amount: amount.to_string(),
        side: Side::Buy,
        price: "25000.5".to_string(),
        quantity: "0.004".to_string(),
        instrument: "BTC-USDT".to_string(),
    }
}

#[tokio::test]
async fn order_references_the_phase_a_allocation() {
    let h = SettlementHarness::new();
    h.fund("250.0", "USDT");

    let placed = h.coordinator.place_order(order("100")).await.unwrap();

    assert_eq!(placed.allocation.field_str("amount"), Some("100.0"));
    assert_eq!(placed.allocation.field_str("currency"), Some("USDT"));
    assert_eq!(
        placed.order.field_str("allocationRef"),
        Some(placed.allocation.id.as_str())
    );
    assert_eq!(placed.order.field_str("orderId"), Some(placed.order_id.as_str()));
    assert_eq!(
        placed.run.history,
        vec![
            SettlementState::Idle,
            SettlementState::Locking,
            SettlementState::Locked,
            SettlementState::Placing,
            SettlementState::Placed,
        ]
    );

    // Change holding for the unlocked remainder.
    let holdings = h.ledger.active("Token:Holding");
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].field_str("amount"), Some("150.0"));

    // One poll each for allocation and order.
    assert_eq!(h.sleeper.delays_ms(), vec![500, 500]);
}

#[tokio::test]
async fn lagging_allocation_is_confirmed_within_budget() {
    let h = SettlementHarness::new();
    h.fund("100", "USDT");
    h.ledger.set_visibility_lag("Settlement:Allocation", 3);

    let placed = h.coordinator.place_order(order("100")).await.unwrap();

    assert_eq!(
        placed.order.field_str("allocationRef"),
        Some(placed.allocation.id.as_str())
    );
    // Allocation: hidden for the offset and frontier reads of attempt 0 and
    // the offset read of attempt 1; order: first poll.
    assert_eq!(h.sleeper.delays_ms(), vec![500, 1000, 500]);
    assert!(h.ledger.active("Token:Holding").is_empty());
}

#[tokio::test]
async fn every_successful_run_links_order_to_its_own_allocation() {
    let h = SettlementHarness::new();
    h.fund("1000", "USDT");
    h.fund("40", "USDT");

    let mut allocations = vec![];
    for amount in ["10", "25.5", "40"] {
        let placed = h.coordinator.place_order(order(amount)).await.unwrap();
        assert_eq!(
            placed.order.field_str("allocationRef"),
            Some(placed.allocation.id.as_str())
        );
        allocations.push(placed.allocation.id);
    }
    allocations.sort();
    allocations.dedup();
    assert_eq!(allocations.len(), 3);
    assert_eq!(h.ledger.active("OrderBook:Order").len(), 3);
}

#[tokio::test]
async fn read_paths_are_told_to_refresh() {
    let h = SettlementHarness::new();
    h.fund("500", "USDT");
    let mut holdings = h.bus.subscribe(holdings_channel(&alice()));
    let mut orders = h.bus.subscribe(orders_channel(&alice()));

    let placed = h.coordinator.place_order(order("100")).await.unwrap();

    let ev = holdings.try_recv().unwrap();
    assert_eq!(ev.reason, RefreshReason::LockConfirmed);
    assert_eq!(ev.contract_id.as_deref(), Some(placed.allocation.id.as_str()));
    assert!(holdings.try_recv().is_none());

    let ev = orders.try_recv().unwrap();
    assert_eq!(ev.reason, RefreshReason::OrderPlaced);
    assert_eq!(ev.contract_id.as_deref(), Some(placed.order.id.as_str()));
}

#[tokio::test]
async fn no_single_holding_large_enough_locks_nothing() {
    let h = SettlementHarness::new();
    h.fund("60", "USDT");
    h.fund("60", "USDT");
    h.fund("500", "EUR");

    let err = h.coordinator.place_order(order("100")).await.unwrap_err();

    assert_eq!(err.state(), Some(SettlementState::LockFailed));
    assert!(!err.funds_locked());
    assert!(h.ledger.submissions().is_empty());
}
