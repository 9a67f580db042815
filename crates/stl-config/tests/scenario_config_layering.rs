//! Layered config: hash stability, overlay precedence, secret refusal, and
//! the typed client view.

use std::io::Write;

use stl_config::{load_layered_yaml, load_layered_yaml_from_strings};

const BASE_YAML: &str = r#"
ledger:
  base_url: "http://ledger.internal:7575"
  request_timeout_ms: 5000
  token_env: "DESK_LEDGER_TOKEN"
  party: "alice::1220aa"
settlement:
  operator: "operator::1220bb"
resolver:
  max_attempts: 5
"#;

const BASE_YAML_REORDERED: &str = r#"
resolver:
  max_attempts: 5
settlement:
  operator: "operator::1220bb"
ledger:
  party: "alice::1220aa"
  token_env: "DESK_LEDGER_TOKEN"
  request_timeout_ms: 5000
  base_url: "http://ledger.internal:7575"
"#;

const OVERLAY_YAML: &str = r#"
ledger:
  request_timeout_ms: 2000
resolver:
  initial_delay_ms: 250
"#;

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn overlay_changes_hash_and_wins() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);

    let cfg = layered.client().unwrap();
    assert_eq!(cfg.ledger.request_timeout_ms, 2000);
    assert_eq!(cfg.ledger.base_url, "http://ledger.internal:7575");
    assert_eq!(cfg.resolver.initial_delay_ms, 250);
    assert_eq!(cfg.resolver.max_delay_ms, 8_000);
    assert_eq!(cfg.party().unwrap().prefix(), "alice");
    assert_eq!(cfg.operator().unwrap().fingerprint(), "1220bb");
}

#[test]
fn literal_token_in_yaml_is_refused() {
    let leaked = r#"
ledger:
  token_env: "eyJhbGciOiJSUzI1NiJ9.payload.sig"
"#;
    let err = load_layered_yaml_from_strings(&[BASE_YAML, leaked]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_SECRET_DETECTED"));
    assert!(msg.contains("/ledger/token_env"));
    assert!(!msg.contains("payload.sig"), "secret value must not leak");
}

#[test]
fn loads_from_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    let overlay_path = dir.path().join("overlay.yaml");
    std::fs::File::create(&base_path)
        .unwrap()
        .write_all(BASE_YAML.as_bytes())
        .unwrap();
    std::fs::File::create(&overlay_path)
        .unwrap()
        .write_all(OVERLAY_YAML.as_bytes())
        .unwrap();

    let from_files = load_layered_yaml(&[
        base_path.to_str().unwrap(),
        overlay_path.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_is_reported_by_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.yaml"));
}
