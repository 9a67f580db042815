//! `stl place` against a mock ledger: distinct exit codes for "nothing
//! happened" and "funds may be locked".

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const ALICE: &str = "alice::1220a1b2c3";

fn config(dir: &TempDir, server: &MockServer) -> String {
    let body = format!(
        "ledger:\n  base_url: {}\n  party: {ALICE}\n  token_env: STL_TEST_TOKEN\n\
         settlement:\n  operator: operator::1220ffee\n\
         resolver:\n  initial_delay_ms: 1\n  max_delay_ms: 2\n  max_attempts: 2\n",
        server.base_url()
    );
    let p = dir.path().join("client.yaml");
    fs::write(&p, body).unwrap();
    p.to_string_lossy().to_string()
}

fn packages(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/v2/packages");
        then.status(200).json_body(json!({"packageIds": ["pkg-1"]}));
    });
}

fn holding_query(server: &MockServer, amount: &str) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/v2/state/active-contracts")
            .body_contains("Token:Holding");
        then.status(200).json_body(json!([{"contractEntry": {"JsActiveContract": {"createdEvent": {
            "contractId": "00h1",
            "templateId": "pkg-1:Token:Holding",
            "createArgument": {"owner": ALICE, "amount": amount, "currency": "USDT"},
            "signatories": [ALICE],
            "offset": 3
        }}}}]));
    });
}

fn place(dir: &TempDir, cfg: &str) -> assert_cmd::assert::Assert {
    Command::cargo_bin("stl")
        .unwrap()
        .current_dir(dir.path())
        .env("STL_TEST_TOKEN", "tok")
        .args([
            "place", "--config", cfg, "--currency", "USDT", "--amount", "100", "--side", "buy",
            "--price", "2", "--quantity", "50", "--instrument", "ABC-USDT",
        ])
        .assert()
}

#[test]
fn no_eligible_holding_exits_one_and_submits_nothing() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    packages(&server);
    holding_query(&server, "40");
    let submit = server.mock(|when, then| {
        when.method(POST).path("/v2/commands/submit-and-wait");
        then.status(200).json_body(json!({"updateId": "u", "completionOffset": 9}));
    });

    place(&dir, &config(&dir, &server))
        .code(1)
        .stderr(predicate::str::contains("no single holding covers"));
    submit.assert_hits(0);
}

#[test]
fn unconfirmed_lock_exits_two() {
    let server = MockServer::start();
    let dir = TempDir::new().unwrap();
    packages(&server);
    holding_query(&server, "250");
    let submit = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/commands/submit-and-wait")
            .body_contains("\"choice\":\"Lock\"");
        then.status(200).json_body(json!({"updateId": "u-lock", "completionOffset": 9}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/v2/state/active-contracts")
            .body_contains("Settlement:Allocation");
        then.status(200).json_body(json!([]));
    });
    let place_submit = server.mock(|when, then| {
        when.method(POST)
            .path("/v2/commands/submit-and-wait")
            .body_contains("\"choice\":\"PlaceOrder\"");
        then.status(200).json_body(json!({"updateId": "u-place", "completionOffset": 10}));
    });

    place(&dir, &config(&dir, &server))
        .code(2)
        .stderr(predicate::str::contains("FUNDS MAY BE LOCKED"))
        .stderr(predicate::str::contains("00h1"));
    submit.assert_hits(1);
    place_submit.assert_hits(0);
}
