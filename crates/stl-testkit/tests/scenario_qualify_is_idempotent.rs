//! Scenario: template qualification against the packages endpoint.
//!
//! Repeated and concurrent qualification with an unchanged package set
//! returns the same identity and hits the identity source once. Refresh and
//! invalidation rediscover; outages fall back to probing active records. A
//! submission the ledger refuses for an unknown template is resent once
//! under the rediscovered package.

use stl_ledger::LedgerError;
use stl_schemas::{Command, TemplateId};
use stl_testkit::{alice, SettlementHarness, PACKAGE_ID};

fn allocation() -> TemplateId {
    TemplateId::parse("Settlement:Allocation").unwrap()
}

#[tokio::test]
async fn repeated_qualification_hits_packages_once() {
    let h = SettlementHarness::new();

    let first = h.templates.qualify(&allocation()).await.unwrap();
    for _ in 0..5 {
        assert_eq!(h.templates.qualify(&allocation()).await.unwrap(), first);
    }
    assert_eq!(first.to_string(), format!("{PACKAGE_ID}:Settlement:Allocation"));
    assert_eq!(h.ledger.package_calls(), 1);
}

#[tokio::test]
async fn concurrent_first_use_is_single_flight() {
    let h = SettlementHarness::new();
    let t = allocation();

    let (a, b, c) = tokio::join!(
        h.templates.qualify(&t),
        h.templates.qualify(&t),
        h.templates.qualify(&t)
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert!(c.is_ok());
    assert_eq!(h.ledger.package_calls(), 1);
}

#[tokio::test]
async fn qualified_ids_pass_through_untouched() {
    let h = SettlementHarness::new();
    let pinned = TemplateId::parse("other-pkg:Settlement:Allocation").unwrap();
    assert_eq!(h.templates.qualify(&pinned).await.unwrap(), pinned);
    assert_eq!(h.ledger.package_calls(), 0);
}

#[tokio::test]
async fn most_recent_package_wins_and_refresh_picks_up_redeploys() {
    let h = SettlementHarness::new();
    h.ledger.set_packages(&["pkg-v1", "pkg-v2"]);
    assert_eq!(
        h.templates.qualify(&allocation()).await.unwrap().package_id(),
        Some("pkg-v2")
    );

    h.ledger.set_packages(&["pkg-v1", "pkg-v2", "pkg-v3"]);
    // Cached until refreshed.
    assert_eq!(
        h.templates.qualify(&allocation()).await.unwrap().package_id(),
        Some("pkg-v2")
    );
    assert_eq!(h.templates.refresh().await.unwrap().as_deref(), Some("pkg-v3"));
    assert_eq!(
        h.templates.qualify(&allocation()).await.unwrap().package_id(),
        Some("pkg-v3")
    );
    assert_eq!(h.ledger.package_calls(), 2);

    h.templates.invalidate();
    h.templates.qualify(&allocation()).await.unwrap();
    assert_eq!(h.ledger.package_calls(), 3);
}

#[tokio::test]
async fn packages_outage_falls_back_to_active_records() {
    let h = SettlementHarness::new();
    h.fund("10", "USDT");
    h.ledger.fail_packages(LedgerError::Rejection {
        status: Some(500),
        message: "internal".to_string(),
    });

    let q = h.templates.qualify(&allocation()).await.unwrap();

    assert_eq!(q.package_id(), Some(PACKAGE_ID));
    assert_eq!(h.cache.get().as_deref(), Some(PACKAGE_ID));
}

#[tokio::test]
async fn no_package_found_returns_short_form_and_downstream_fails_typed() {
    let h = SettlementHarness::new();
    h.ledger.fail_packages(LedgerError::Rejection {
        status: Some(500),
        message: "internal".to_string(),
    });

    let q = h.templates.qualify(&allocation()).await.unwrap();
    assert_eq!(q, allocation());
    assert!(h.cache.get().is_none());

    let err = h
        .commands
        .submit(
            vec![Command::exercise("00x", allocation(), "Release", serde_json::json!({}))],
            vec![alice()],
        )
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert!(err.to_string().contains("TEMPLATES_OR_INTERFACES_NOT_FOUND"));
}

#[tokio::test]
async fn auth_failure_during_discovery_propagates() {
    let h = SettlementHarness::new();
    h.ledger.fail_packages(LedgerError::Auth {
        message: "token expired".to_string(),
    });

    let err = h.templates.qualify(&allocation()).await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn stale_package_is_rediscovered_and_submission_resent_once() {
    let h = SettlementHarness::new();
    h.ledger.set_packages(&["pkg-v1"]);
    assert_eq!(
        h.templates.qualify(&allocation()).await.unwrap().package_id(),
        Some("pkg-v1")
    );
    h.ledger.set_packages(&["pkg-v1", "pkg-v2"]);

    let holding = TemplateId::parse("Token:Holding").unwrap();
    let payload = serde_json::json!({"owner": alice().as_str(), "amount": "5", "currency": "USDT"});
    h.commands
        .submit(
            vec![Command::create(holding, payload.as_object().cloned().unwrap())],
            vec![alice()],
        )
        .await
        .unwrap();

    let sent = h.ledger.submissions();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].command_id, sent[1].command_id);
    assert_eq!(sent[0].commands[0].record_type().package_id(), Some("pkg-v1"));
    assert_eq!(sent[1].commands[0].record_type().package_id(), Some("pkg-v2"));
    assert_eq!(h.ledger.commits().len(), 1);
    assert_eq!(h.cache.get().as_deref(), Some("pkg-v2"));
    assert_eq!(h.ledger.active("Token:Holding").len(), 1);
}

#[tokio::test]
async fn pinned_package_is_never_rewritten() {
    let h = SettlementHarness::new();
    let pinned = TemplateId::parse("pkg-gone:Token:Holding").unwrap();
    let payload = serde_json::json!({"owner": alice().as_str(), "amount": "5", "currency": "USDT"});

    let err = h
        .commands
        .submit(
            vec![Command::create(pinned, payload.as_object().cloned().unwrap())],
            vec![alice()],
        )
        .await
        .unwrap_err();

    assert!(err.is_unknown_template());
    assert_eq!(h.ledger.submissions().len(), 1);
    assert_eq!(h.ledger.package_calls(), 0);
}
