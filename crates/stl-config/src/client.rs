//! Typed client configuration extracted from the merged YAML document.
//!
//! Every section is optional; absent keys fall back to the defaults below.
//! Unknown keys inside a known section are rejected so a typo cannot
//! silently fall back to a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use stl_schemas::{Party, TemplateId};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub templates: TemplateNames,
    #[serde(default)]
    pub choices: ChoiceNames,
    #[serde(default)]
    pub resolver: ResolverSection,
    #[serde(default)]
    pub settlement: SettlementSection,
}

impl ClientConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        ClientConfig::deserialize(config_json).context("CONFIG_INVALID: client config")
    }

    /// The configured reading/acting party; an error when absent.
    pub fn party(&self) -> Result<&Party> {
        self.ledger
            .party
            .as_ref()
            .context("CONFIG_MISSING: /ledger/party is required for this command")
    }

    pub fn operator(&self) -> Result<&Party> {
        self.settlement
            .operator
            .as_ref()
            .context("CONFIG_MISSING: /settlement/operator is required for settlement")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-HTTP-call timeout. Independent of the resolver's retry budget.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// NAME of the env var holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub party: Option<Party>,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            token_env: default_token_env(),
            party: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:7575".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_token_env() -> String {
    "STL_LEDGER_TOKEN".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateNames {
    #[serde(default = "default_holding")]
    pub holding: TemplateId,
    #[serde(default = "default_allocation")]
    pub allocation: TemplateId,
    #[serde(default = "default_order")]
    pub order: TemplateId,
    /// Types whose active contracts reveal the deployed package id when the
    /// packages endpoint is unavailable. Tried in order.
    #[serde(default = "default_fallback")]
    pub fallback: Vec<TemplateId>,
}

impl Default for TemplateNames {
    fn default() -> Self {
        Self {
            holding: default_holding(),
            allocation: default_allocation(),
            order: default_order(),
            fallback: default_fallback(),
        }
    }
}

fn default_holding() -> TemplateId {
    TemplateId::short("Token", "Holding")
}

fn default_allocation() -> TemplateId {
    TemplateId::short("Settlement", "Allocation")
}

fn default_order() -> TemplateId {
    TemplateId::short("OrderBook", "Order")
}

fn default_fallback() -> Vec<TemplateId> {
    vec![default_holding(), default_allocation()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChoiceNames {
    #[serde(default = "default_lock")]
    pub lock: String,
    #[serde(default = "default_release")]
    pub release: String,
    #[serde(default = "default_place")]
    pub place: String,
    #[serde(default = "default_cancel")]
    pub cancel: String,
}

impl Default for ChoiceNames {
    fn default() -> Self {
        Self {
            lock: default_lock(),
            release: default_release(),
            place: default_place(),
            cancel: default_cancel(),
        }
    }
}

fn default_lock() -> String {
    "Lock".to_string()
}

fn default_release() -> String {
    "Release".to_string()
}

fn default_place() -> String {
    "PlaceOrder".to_string()
}

fn default_cancel() -> String {
    "Cancel".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementSection {
    /// Order-book operator; beneficiary of every allocation.
    #[serde(default)]
    pub operator: Option<Party>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = ClientConfig::from_json(&json!({})).unwrap();
        assert_eq!(cfg.ledger.request_timeout_ms, 10_000);
        assert_eq!(cfg.resolver.max_attempts, 5);
        assert_eq!(cfg.templates.order.to_string(), "OrderBook:Order");
        assert_eq!(cfg.choices.lock, "Lock");
        assert!(cfg.party().is_err());
    }

    #[test]
    fn unknown_key_in_section_is_rejected() {
        let err = ClientConfig::from_json(&json!({"resolver": {"max_attemps": 3}})).unwrap_err();
        assert!(format!("{err:#}").contains("CONFIG_INVALID"));
    }

    #[test]
    fn invalid_party_is_rejected() {
        assert!(ClientConfig::from_json(&json!({"ledger": {"party": "nobody"}})).is_err());
    }
}
