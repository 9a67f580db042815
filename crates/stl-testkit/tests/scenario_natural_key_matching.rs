//! Scenario: two contracts with identical structure, different natural keys.
//!
//! The resolver returns only the contract whose key equals the one the
//! caller generated before submitting.

use serde_json::json;
use stl_reconcile::Matcher;
use stl_schemas::Offset;
use stl_testkit::{alice, operator, order_type, SettlementHarness};

fn seed_order(h: &SettlementHarness, order_id: &str) -> String {
    h.ledger.seed(
        "OrderBook:Order",
        json!({
            "orderId": order_id,
            "owner": alice().as_str(),
            "allocationRef": "00alloc",
            "side": "Buy",
            "price": "10.0",
            "quantity": "1.0",
            "instrument": "ABC-USDT",
            "status": "Open",
        }),
        &[alice()],
        &[operator()],
    )
}

#[tokio::test]
async fn only_the_matching_key_is_returned() {
    let h = SettlementHarness::new();
    let theirs = seed_order(&h, "ord-theirs");
    let mine = seed_order(&h, "ord-mine");
    assert_ne!(theirs, mine);

    let got = h
        .resolver
        .resolve(
            &order_type(),
            &alice(),
            &Offset::new("2"),
            &Matcher::natural_key("orderId", "ord-mine"),
        )
        .await
        .unwrap();
    assert_eq!(got.id, mine);

    let got = h
        .resolver
        .resolve(
            &order_type(),
            &alice(),
            &Offset::new("1"),
            &Matcher::natural_key("orderId", "ord-theirs"),
        )
        .await
        .unwrap();
    assert_eq!(got.id, theirs);
}

#[tokio::test]
async fn structural_match_cannot_tell_twins_apart_but_key_can() {
    let h = SettlementHarness::new();
    seed_order(&h, "ord-a");
    seed_order(&h, "ord-b");

    let structural = Matcher::PayloadSubset(
        json!({"side": "Buy", "price": "10", "instrument": "ABC-USDT"})
            .as_object()
            .unwrap()
            .clone(),
    );
    let contracts = h.ledger.active("OrderBook:Order");
    assert_eq!(contracts.iter().filter(|c| structural.matches(c)).count(), 2);

    let keyed = Matcher::natural_key("orderId", "ord-b");
    assert_eq!(contracts.iter().filter(|c| keyed.matches(c)).count(), 1);
}

#[tokio::test]
async fn unknown_key_times_out_as_a_confirmation_timeout() {
    let h = SettlementHarness::new();
    seed_order(&h, "ord-a");

    let err = h
        .resolver
        .resolve(
            &order_type(),
            &alice(),
            &Offset::new("1"),
            &Matcher::natural_key("orderId", "ord-zzz"),
        )
        .await
        .unwrap_err();
    assert!(err.is_confirmation_timeout());
    assert_eq!(h.sleeper.delays().len(), 5);
}
