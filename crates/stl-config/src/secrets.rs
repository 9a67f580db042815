//! Runtime secret resolution.
//!
//! # Contract
//! - Config stores only the env var NAME (`/ledger/token_env`).
//! - Callers resolve once at startup and pass [`ResolvedSecrets`] into
//!   constructors; no other code reads the environment for credentials.
//! - `Debug` redacts values; errors name the variable, never the value.

use anyhow::{bail, Result};

use crate::ClientConfig;

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub ledger_token: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("ledger_token", &"<REDACTED>")
            .finish()
    }
}

/// Resolve the ledger access token named by `/ledger/token_env`.
pub fn resolve_secrets(cfg: &ClientConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, |name| std::env::var(name).ok())
}

/// Same as [`resolve_secrets`] with an injectable lookup (tests).
pub fn resolve_secrets_with<F>(cfg: &ClientConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let var = cfg.ledger.token_env.trim();
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => Ok(ResolvedSecrets {
            ledger_token: v.trim().to_string(),
        }),
        _ => bail!(
            "SECRETS_MISSING: required env var '{}' (ledger access token) is not set or empty",
            var
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_names_the_variable() {
        let cfg = ClientConfig::default();
        let err = resolve_secrets_with(&cfg, |_| None).unwrap_err();
        assert!(err.to_string().contains("STL_LEDGER_TOKEN"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let cfg = ClientConfig::default();
        assert!(resolve_secrets_with(&cfg, |_| Some("   ".to_string())).is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = ClientConfig::default();
        let s = resolve_secrets_with(&cfg, |_| Some("tok-123".to_string())).unwrap();
        assert_eq!(s.ledger_token, "tok-123");
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("tok-123"));
        assert!(dbg.contains("REDACTED"));
    }
}
