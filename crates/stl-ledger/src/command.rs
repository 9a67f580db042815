//! Command submission.

use serde_json::Value;
use stl_schemas::{Command, CommandId, Offset, Party, SubmissionResult};
use tracing::{info, warn};

use crate::api::SubmitRequest;
use crate::session::{Call, LedgerSession};
use crate::template::TemplateResolver;
use crate::LedgerError;

#[derive(Debug, Clone)]
pub struct CommandClient {
    session: LedgerSession,
    templates: TemplateResolver,
}

impl CommandClient {
    pub fn new(session: LedgerSession, templates: TemplateResolver) -> Self {
        Self { session, templates }
    }

    pub fn templates(&self) -> &TemplateResolver {
        &self.templates
    }

    /// Submit under a fresh idempotency key.
    pub async fn submit(
        &self,
        commands: Vec<Command>,
        act_as: Vec<Party>,
    ) -> Result<SubmissionResult, LedgerError> {
        self.submit_with_id(CommandId::generate(), commands, act_as).await
    }

    /// Submit under a caller-pinned key. Reusing a key across calls is how a
    /// caller retries a submission whose outcome is unknown.
    pub async fn submit_with_id(
        &self,
        command_id: CommandId,
        commands: Vec<Command>,
        act_as: Vec<Party>,
    ) -> Result<SubmissionResult, LedgerError> {
        if commands.is_empty() {
            return Err(LedgerError::invalid_request("submission has no commands"));
        }
        if act_as.is_empty() {
            return Err(LedgerError::invalid_request("submission has no actAs party"));
        }

        let mut req = SubmitRequest {
            commands: self.qualify_all(&commands).await?,
            command_id,
            act_as,
        };
        let body = match self.session.execute(Call::Submit(&req)).await {
            Ok(body) => body,
            Err(e) if e.is_unknown_template() && has_short_form(&commands) => {
                // Refused, so not applied: the same commandId is resent.
                let used = self.templates.cache().get();
                let fresh = self.templates.refresh().await?;
                if fresh.is_none() || fresh == used {
                    return Err(e);
                }
                warn!(
                    command_id = %req.command_id,
                    stale = ?used.as_deref(),
                    package_id = ?fresh.as_deref(),
                    "template unknown to the ledger; resubmitting under the rediscovered package"
                );
                req.commands = self.qualify_all(&commands).await?;
                self.session.execute(Call::Submit(&req)).await?
            }
            Err(e) => return Err(e),
        };
        let result = parse_submission(&body)?;

        info!(
            command_id = %req.command_id,
            update_id = %result.update_id,
            completion_offset = %result.completion_offset,
            commands = req.commands.len(),
            "submission committed"
        );
        Ok(result)
    }

    async fn qualify_all(&self, commands: &[Command]) -> Result<Vec<Command>, LedgerError> {
        let mut qualified = Vec::with_capacity(commands.len());
        for cmd in commands {
            let record_type = self.templates.qualify(cmd.record_type()).await?;
            qualified.push(cmd.with_record_type(record_type));
        }
        Ok(qualified)
    }
}

/// Some record type was qualified here rather than pinned by the caller.
fn has_short_form(commands: &[Command]) -> bool {
    commands.iter().any(|c| !c.record_type().is_qualified())
}

/// `{updateId, completionOffset}` at the top level or nested under
/// `transaction` / `completion`; the offset may be a string or a number.
pub(crate) fn parse_submission(body: &Value) -> Result<SubmissionResult, LedgerError> {
    let scopes = [
        Some(body),
        body.get("transaction"),
        body.get("completion"),
    ];

    let mut update_id = None;
    let mut offset = None;
    for scope in scopes.into_iter().flatten() {
        if update_id.is_none() {
            update_id = scope
                .get("updateId")
                .or_else(|| scope.get("transactionId"))
                .and_then(Value::as_str);
        }
        if offset.is_none() {
            offset = scope
                .get("completionOffset")
                .or_else(|| scope.get("offset"))
                .and_then(offset_value);
        }
    }

    match (update_id, offset) {
        (Some(u), Some(o)) => Ok(SubmissionResult {
            update_id: u.to_string(),
            completion_offset: o,
        }),
        _ => Err(LedgerError::decode(format!(
            "submission response lacks updateId/completionOffset: {body}"
        ))),
    }
}

fn offset_value(v: &Value) -> Option<Offset> {
    match v {
        Value::String(s) if !s.is_empty() => Some(Offset::new(s.clone())),
        Value::Number(n) => Some(Offset::new(n.to_string())),
        _ => None,
    }
}
