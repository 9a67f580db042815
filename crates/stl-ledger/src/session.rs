//! Authenticated round trips with the shared recovery policy.
//!
//! Every client in this crate goes through [`LedgerSession::execute`]:
//! one retry after `Auth` (with a forced token refresh), one retry after
//! `Transport` (identical request, so a submit keeps its `commandId`).
//! `Rejection`, `Permission` and `Decode` return immediately.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{LedgerApi, QueryRequest, SubmitRequest, TokenSource};
use crate::LedgerError;

/// One endpoint invocation. Borrowed so a retry re-sends the exact same body.
#[derive(Debug, Clone, Copy)]
pub enum Call<'a> {
    Submit(&'a SubmitRequest),
    Query(&'a QueryRequest),
    Packages,
}

impl Call<'_> {
    fn endpoint(&self) -> &'static str {
        match self {
            Call::Submit(_) => "submit",
            Call::Query(_) => "active-contracts",
            Call::Packages => "packages",
        }
    }
}

#[derive(Clone)]
pub struct LedgerSession {
    api: Arc<dyn LedgerApi>,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for LedgerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSession").finish_non_exhaustive()
    }
}

impl LedgerSession {
    pub fn new(api: Arc<dyn LedgerApi>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { api, tokens }
    }

    pub async fn execute(&self, call: Call<'_>) -> Result<Value, LedgerError> {
        let mut token = self.tokens.token().await?;
        let mut auth_retried = false;
        let mut transport_retried = false;

        loop {
            let out = match call {
                Call::Submit(req) => self.api.submit_and_wait(&token, req).await,
                Call::Query(req) => self.api.active_contracts(&token, req).await,
                Call::Packages => self.api.list_packages(&token).await,
            };

            match out {
                Err(LedgerError::Auth { message }) if !auth_retried => {
                    warn!(endpoint = call.endpoint(), %message, "auth failed; refreshing token once");
                    auth_retried = true;
                    token = self.tokens.refresh().await?;
                }
                Err(LedgerError::Transport { message }) if !transport_retried => {
                    warn!(endpoint = call.endpoint(), %message, "transport failure; retrying once");
                    transport_retried = true;
                }
                other => {
                    if let Err(e) = &other {
                        debug!(endpoint = call.endpoint(), error = %e, "ledger call failed");
                    }
                    return other;
                }
            }
        }
    }
}
