//! Command handler modules for stl-cli.
//!
//! Shared wiring used by every ledger-facing command lives here.
//! Command-specific logic lives in the submodules.

pub mod ledger;
pub mod settle;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use stl_config::{secrets::resolve_secrets, ClientConfig, LoadedConfig};
use stl_execution::{Coordinator, RefreshBus, SettlementChoices, SettlementTemplates};
use stl_ledger::{
    ActiveStateQuery, CommandClient, HttpLedger, LedgerSession, PackageCache, StaticToken,
    TemplateResolver,
};
use stl_reconcile::{Backoff, ContractResolver, TokioSleeper};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn load_config(paths: &[String]) -> Result<(LoadedConfig, ClientConfig)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = stl_config::load_layered_yaml(&path_refs)?;
    let cfg = loaded.client()?;
    Ok((loaded, cfg))
}

/// Every ledger component built once from config. One process, one
/// package cache.
pub struct Client {
    pub cfg: ClientConfig,
    pub templates: TemplateResolver,
    pub commands: CommandClient,
    pub query: ActiveStateQuery,
    pub resolver: ContractResolver,
}

impl Client {
    pub fn connect(cfg: ClientConfig) -> Result<Self> {
        let secrets = resolve_secrets(&cfg)?;
        let http = HttpLedger::new(
            cfg.ledger.base_url.clone(),
            Duration::from_millis(cfg.ledger.request_timeout_ms),
        )
        .context("LEDGER_CLIENT: failed to build http client")?;

        let session = LedgerSession::new(Arc::new(http), Arc::new(StaticToken::new(secrets.ledger_token)));
        let templates = TemplateResolver::new(
            session.clone(),
            Arc::new(PackageCache::new()),
            cfg.templates.fallback.clone(),
            cfg.ledger.party.clone(),
        );
        let commands = CommandClient::new(session.clone(), templates.clone());
        let query = ActiveStateQuery::new(session, templates.clone());
        let backoff = Backoff::from_millis(
            cfg.resolver.initial_delay_ms,
            cfg.resolver.max_delay_ms,
            cfg.resolver.max_attempts,
        );
        let resolver = ContractResolver::new(query.clone(), Arc::new(TokioSleeper), backoff);

        Ok(Self {
            cfg,
            templates,
            commands,
            query,
            resolver,
        })
    }

    pub fn coordinator(&self) -> Result<Coordinator> {
        let operator = self.cfg.operator()?.clone();
        Ok(Coordinator::new(
            self.commands.clone(),
            self.query.clone(),
            self.resolver.clone(),
            SettlementTemplates {
                holding: self.cfg.templates.holding.clone(),
                allocation: self.cfg.templates.allocation.clone(),
                order: self.cfg.templates.order.clone(),
            },
            SettlementChoices {
                lock: self.cfg.choices.lock.clone(),
                release: self.cfg.choices.release.clone(),
                place: self.cfg.choices.place.clone(),
                cancel: self.cfg.choices.cancel.clone(),
            },
            operator,
            RefreshBus::new(),
        ))
    }
}

pub fn print_json(v: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}
