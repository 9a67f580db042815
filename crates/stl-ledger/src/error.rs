use std::fmt;

/// Error codes the ledger uses when a command names a template or package
/// it does not have.
const UNKNOWN_TEMPLATE_CODES: &[&str] = &["TEMPLATES_OR_INTERFACES_NOT_FOUND", "PACKAGE_NOT_FOUND"];

/// Failure taxonomy for every ledger round trip.
///
/// | variant      | meaning                                  | retried by the client            |
/// |--------------|------------------------------------------|----------------------------------|
/// | `Auth`       | missing/expired credential (401)         | once, after a token refresh      |
/// | `Permission` | party lacks rights (403)                 | never; reads degrade to empty    |
/// | `Rejection`  | business rule / malformed command        | never                            |
/// | `Transport`  | network, timeout, 502/503/504            | once, with the same `commandId`  |
/// | `Decode`     | 2xx body not in any known shape          | never                            |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    Auth { message: String },
    Permission { message: String },
    /// `status` is `None` when the request was refused before leaving the process.
    Rejection { status: Option<u16>, message: String },
    Transport { message: String },
    Decode { message: String },
}

impl LedgerError {
    pub fn is_auth(&self) -> bool {
        matches!(self, LedgerError::Auth { .. })
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, LedgerError::Permission { .. })
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, LedgerError::Rejection { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, LedgerError::Transport { .. })
    }

    /// The request may or may not have committed: the connection failed, or
    /// a 2xx body could not be read. Callers must not treat this as a refusal.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, LedgerError::Transport { .. } | LedgerError::Decode { .. })
    }

    /// The ledger does not know a template the command named: typically a
    /// cached package id that has since been superseded.
    pub fn is_unknown_template(&self) -> bool {
        match self {
            LedgerError::Rejection {
                status: Some(_),
                message,
            } => UNKNOWN_TEMPLATE_CODES.iter().any(|code| message.contains(code)),
            _ => false,
        }
    }

    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        LedgerError::Rejection {
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        LedgerError::Decode {
            message: message.into(),
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Auth { message } => write!(f, "ledger auth error: {message}"),
            LedgerError::Permission { message } => {
                write!(f, "ledger permission denied: {message}")
            }
            LedgerError::Rejection {
                status: Some(s),
                message,
            } => write!(f, "ledger rejected command status={s}: {message}"),
            LedgerError::Rejection {
                status: None,
                message,
            } => write!(f, "ledger request refused locally: {message}"),
            LedgerError::Transport { message } => write!(f, "ledger transport error: {message}"),
            LedgerError::Decode { message } => write!(f, "ledger response decode error: {message}"),
        }
    }
}

impl std::error::Error for LedgerError {}
