//! reqwest-backed [`LedgerApi`].
//!
//! Token is passed per call and never logged. Every request carries the
//! client-wide timeout so one slow call cannot eat a resolver's whole
//! retry budget.

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::api::{LedgerApi, QueryRequest, SubmitRequest};
use crate::LedgerError;

const SUBMIT_PATH: &str = "/v2/commands/submit-and-wait";
const ACTIVE_CONTRACTS_PATH: &str = "/v2/state/active-contracts";
const PACKAGES_PATH: &str = "/v2/packages";

#[derive(Debug, Clone)]
pub struct HttpLedger {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport {
                message: format!("http client build failed: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn finish(&self, what: &str, resp: reqwest::Response) -> Result<Value, LedgerError> {
        let status = resp.status();
        let text = resp.text().await.map_err(|e| LedgerError::Transport {
            message: format!("{what}: reading response body failed: {e}"),
        })?;
        debug!(endpoint = what, status = status.as_u16(), "ledger response");

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| LedgerError::decode(format!("{what}: body is not json: {e}")));
        }

        Err(status_to_error(status, &text))
    }
}

fn transport(what: &str, e: reqwest::Error) -> LedgerError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connect failed"
    } else {
        "request failed"
    };
    LedgerError::Transport {
        message: format!("{what}: {kind}: {e}"),
    }
}

/// Map a non-2xx response to the error taxonomy, keeping the ledger's own
/// wording so operators can diagnose from the message alone.
pub(crate) fn status_to_error(status: StatusCode, body: &str) -> LedgerError {
    let message = error_detail(body).unwrap_or_else(|| format!("http {}", status.as_u16()));
    match status {
        StatusCode::UNAUTHORIZED => LedgerError::Auth { message },
        StatusCode::FORBIDDEN => LedgerError::Permission { message },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            LedgerError::Transport { message }
        }
        other => LedgerError::Rejection {
            status: Some(other.as_u16()),
            message,
        },
    }
}

/// `message`, then `errors[]`, then `cause`, then the raw body.
fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(v) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_string());
    };

    let mut parts: Vec<String> = Vec::new();
    if let Some(m) = v.get("message").and_then(Value::as_str) {
        parts.push(m.to_string());
    }
    if let Some(errors) = v.get("errors").and_then(Value::as_array) {
        for e in errors {
            match e.as_str() {
                Some(s) => parts.push(s.to_string()),
                None => parts.push(e.to_string()),
            }
        }
    }
    if parts.is_empty() {
        if let Some(c) = v.get("cause").and_then(Value::as_str) {
            parts.push(c.to_string());
        }
    }
    if parts.is_empty() {
        return Some(trimmed.to_string());
    }
    Some(parts.join("; "))
}

#[async_trait::async_trait]
impl LedgerApi for HttpLedger {
    async fn submit_and_wait(&self, token: &str, req: &SubmitRequest) -> Result<Value, LedgerError> {
        let resp = self
            .http
            .post(self.url(SUBMIT_PATH))
            .bearer_auth(token)
            .json(req)
            .send()
            .await
            .map_err(|e| transport("submit", e))?;
        self.finish("submit", resp).await
    }

    async fn active_contracts(
        &self,
        token: &str,
        req: &QueryRequest,
    ) -> Result<Value, LedgerError> {
        let resp = self
            .http
            .post(self.url(ACTIVE_CONTRACTS_PATH))
            .bearer_auth(token)
            .json(req)
            .send()
            .await
            .map_err(|e| transport("active-contracts", e))?;
        self.finish("active-contracts", resp).await
    }

    async fn list_packages(&self, token: &str) -> Result<Value, LedgerError> {
        let resp = self
            .http
            .get(self.url(PACKAGES_PATH))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport("packages", e))?;
        self.finish("packages", resp).await
    }
}
