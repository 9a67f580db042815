//! Template identity qualification.
//!
//! The ledger wants `<packageId>:Module:Type`; callers and configuration
//! speak `Module:Type`. [`TemplateResolver`] bridges the two using one
//! discovered package id held in an injectable [`PackageCache`].

use serde_json::Value;
use std::sync::{Arc, RwLock};
use stl_schemas::{Offset, Party, TemplateId};
use tracing::{debug, info, warn};

use crate::api::{InclusiveFilter, QueryRequest};
use crate::envelope;
use crate::session::{Call, LedgerSession};
use crate::LedgerError;

// ---------------------------------------------------------------------------
// PackageCache
// ---------------------------------------------------------------------------

/// Discovered package id for the lifetime of the cache.
///
/// Readers never wait on discovery: they take the current value (possibly
/// stale during a refresh). Discovery itself is serialized by `discovery`
/// so concurrent first uses hit the identity source once.
#[derive(Debug, Default)]
pub struct PackageCache {
    current: RwLock<Option<Arc<str>>>,
    discovery: tokio::sync::Mutex<()>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated cache; nothing will be discovered until invalidated.
    pub fn with_package(package_id: &str) -> Self {
        Self {
            current: RwLock::new(Some(Arc::from(package_id))),
            discovery: tokio::sync::Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<Arc<str>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set(&self, value: Option<Arc<str>>) {
        match self.current.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    /// Drop the cached id; the next qualification rediscovers.
    pub fn invalidate(&self) {
        self.set(None);
    }
}

// ---------------------------------------------------------------------------
// TemplateResolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TemplateResolver {
    session: LedgerSession,
    cache: Arc<PackageCache>,
    fallback: Vec<TemplateId>,
    reader: Option<Party>,
}

impl TemplateResolver {
    /// `fallback` types are probed in order, reading as `reader`, when the
    /// packages endpoint yields nothing. Without a reader the probe is skipped.
    pub fn new(
        session: LedgerSession,
        cache: Arc<PackageCache>,
        fallback: Vec<TemplateId>,
        reader: Option<Party>,
    ) -> Self {
        Self {
            session,
            cache,
            fallback,
            reader,
        }
    }

    pub fn cache(&self) -> &Arc<PackageCache> {
        &self.cache
    }

    /// Qualified ids pass through. When no package id can be discovered
    /// the short form comes back unchanged and the ledger's own error on
    /// the downstream call is what the caller sees.
    pub async fn qualify(&self, template: &TemplateId) -> Result<TemplateId, LedgerError> {
        if template.is_qualified() {
            return Ok(template.clone());
        }
        match self.package_id().await? {
            Some(pkg) => Ok(template.qualify(&pkg)),
            None => {
                warn!(template = %template, "no package id discovered; using short form");
                Ok(template.clone())
            }
        }
    }

    /// Cached package id, discovering it on first use.
    pub async fn package_id(&self) -> Result<Option<Arc<str>>, LedgerError> {
        if let Some(pkg) = self.cache.get() {
            return Ok(Some(pkg));
        }

        let _flight = self.cache.discovery.lock().await;
        if let Some(pkg) = self.cache.get() {
            return Ok(Some(pkg));
        }

        let found = self.discover().await?;
        if let Some(pkg) = &found {
            self.cache.set(Some(pkg.clone()));
        }
        Ok(found)
    }

    /// Force rediscovery. Readers keep the old value until the swap; a
    /// refresh that finds nothing leaves the cache empty.
    pub async fn refresh(&self) -> Result<Option<Arc<str>>, LedgerError> {
        let _flight = self.cache.discovery.lock().await;
        let found = self.discover().await?;
        self.cache.set(found.clone());
        Ok(found)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    async fn discover(&self) -> Result<Option<Arc<str>>, LedgerError> {
        match self.session.execute(Call::Packages).await {
            Ok(body) => {
                if let Some(pkg) = latest_package(&body) {
                    info!(package_id = %pkg, "package id discovered from packages endpoint");
                    return Ok(Some(Arc::from(pkg)));
                }
                debug!("packages endpoint returned no package ids");
            }
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => warn!(error = %e, "packages endpoint unavailable"),
        }

        let Some(reader) = &self.reader else {
            return Ok(None);
        };

        for probe in &self.fallback {
            let req = QueryRequest::for_party(
                reader,
                &Offset::frontier(),
                InclusiveFilter {
                    record_type_ids: vec![probe.short_form()],
                    contract_ids: vec![],
                },
            );
            let body = match self.session.execute(Call::Query(&req)).await {
                Ok(body) => body,
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    debug!(probe = %probe, error = %e, "fallback probe failed");
                    continue;
                }
            };
            let contracts = match envelope::normalize(&body) {
                Ok(c) => c,
                Err(e) => {
                    debug!(probe = %probe, error = %e, "fallback probe undecodable");
                    continue;
                }
            };
            if let Some(pkg) = contracts.iter().find_map(|c| c.record_type.package_id()) {
                info!(package_id = %pkg, probe = %probe, "package id discovered from active records");
                return Ok(Some(Arc::from(pkg)));
            }
        }

        Ok(None)
    }
}

/// Most recently deployed package: the last id in the list.
fn latest_package(body: &Value) -> Option<&str> {
    body.get("packageIds")?
        .as_array()?
        .iter()
        .rev()
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
}
