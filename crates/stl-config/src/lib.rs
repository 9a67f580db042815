//! stl-config
//!
//! Layered YAML configuration for the settlement client.
//!
//! - Documents merge in order; later documents override earlier ones.
//! - Literal secrets are refused (`CONFIG_SECRET_DETECTED`): YAML names the
//!   env var that holds a token, never the token.
//! - The merged document is canonicalized to JSON and hashed so a run can
//!   be tied to the exact config it used.
//! - [`ClientConfig`] is the typed view every other crate consumes.

mod client;
pub mod secrets;

pub use client::{
    ChoiceNames, ClientConfig, LedgerSection, ResolverSection, SettlementSection, TemplateNames,
};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Leaf string values starting with any of these abort loading.
const SECRET_PREFIXES: &[&str] = &[
    "eyJ",        // JWT (ledger access tokens)
    "Bearer ",    // pasted Authorization header
    "-----BEGIN", // PEM private keys
    "sk-",
    "ghp_",
    "xoxb-",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view with defaults filled in for absent sections.
    pub fn client(&self) -> Result<ClientConfig> {
        ClientConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml (layer {i})"))?;
        let doc = serde_json::to_value(doc).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, doc);
    }

    refuse_secret_literals(&merged)?;

    let canonical_json = canonical_json(&merged)?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                let prior = base_map.remove(&k).unwrap_or(Value::Null);
                base_map.insert(k, deep_merge(prior, v));
            }
            Value::Object(base_map)
        }
        (_, other) => other,
    }
}

/// Sorted-key compact JSON, independent of YAML key order.
fn canonical_json(v: &Value) -> Result<String> {
    fn sorted(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for k in keys {
                    out.insert(k.clone(), sorted(&map[k]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sorted(v)).context("canonical json serialize failed")
}

fn refuse_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_string_leaves(v, String::new(), &mut leaves);
    for (pointer, s) in leaves {
        if looks_like_secret(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", pointer);
        }
    }
    Ok(())
}

fn collect_string_leaves<'a>(v: &'a Value, pointer: String, out: &mut Vec<(String, &'a str)>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let token = k.replace('~', "~0").replace('/', "~1");
                collect_string_leaves(child, format!("{pointer}/{token}"), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_string_leaves(child, format!("{pointer}/{i}"), out);
            }
        }
        Value::String(s) => out.push((pointer, s.as_str())),
        _ => {}
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
